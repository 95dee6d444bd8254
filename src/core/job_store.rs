//! Authoritative in-memory job state
//!
//! Every state change goes through [`JobStore::transition`] (or one of its
//! variants), which checks the current state against the allowed source
//! states and publishes the matching lifecycle event. Events are published
//! after the internal lock is released, so handlers may call back into the
//! store.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::core::events::EventBus;
use crate::core::job::{JobId, JobRecord};
use crate::error::JobStoreError;

/// Keyed store of job records of one kind
#[derive(Debug)]
pub struct JobStore<J: JobRecord> {
    jobs: Mutex<HashMap<JobId, J>>,
    bus: EventBus,
}

impl<J: JobRecord> JobStore<J> {
    pub fn new(bus: EventBus) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            bus,
        }
    }

    /// Insert a new record and publish its submission event
    pub fn put(&self, job: J) -> Result<(), JobStoreError> {
        let event = job.submitted_event();
        {
            let mut jobs = self.jobs.lock();
            if jobs.contains_key(&job.id()) {
                return Err(JobStoreError::Duplicate { id: job.id() });
            }
            jobs.insert(job.id(), job);
        }
        if let Some(event) = event {
            self.bus.publish(&event);
        }
        Ok(())
    }

    /// Snapshot of a record
    pub fn get(&self, id: JobId) -> Option<J> {
        self.jobs.lock().get(&id).cloned()
    }

    /// Move a job from one of `from` to `to`
    pub fn transition(&self, id: JobId, from: &[J::State], to: J::State) -> Result<J, JobStoreError> {
        self.transition_with(id, from, to, |_| {})
    }

    /// Like [`transition`](Self::transition), applying `update` to the record
    /// before the event for the new state is built
    pub fn transition_with<F>(
        &self,
        id: JobId,
        from: &[J::State],
        to: J::State,
        update: F,
    ) -> Result<J, JobStoreError>
    where
        F: FnOnce(&mut J),
    {
        let snapshot = {
            let mut jobs = self.jobs.lock();
            let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound { id })?;
            let current = job.state();
            if !from.contains(&current) {
                return Err(JobStoreError::InvalidTransition {
                    id,
                    from: format!("{current:?}"),
                    to: format!("{to:?}"),
                    allowed: format!("{from:?}"),
                });
            }
            update(job);
            job.set_state(to, Utc::now());
            job.clone()
        };
        if let Some(event) = snapshot.state_event() {
            self.bus.publish(&event);
        }
        Ok(snapshot)
    }

    /// Move every job matching `predicate` that is currently in `from` to `to`
    ///
    /// Jobs in other states are left alone, so this is safe to call more than
    /// once for the same trigger. Returns the transitioned records.
    pub fn transition_matching<P>(&self, predicate: P, from: J::State, to: J::State) -> Vec<J>
    where
        P: Fn(&J) -> bool,
    {
        let now = Utc::now();
        let moved: Vec<J> = {
            let mut jobs = self.jobs.lock();
            jobs.values_mut()
                .filter(|job| job.state() == from && predicate(&**job))
                .map(|job| {
                    job.set_state(to, now);
                    job.clone()
                })
                .collect()
        };
        for job in &moved {
            if let Some(event) = job.state_event() {
                self.bus.publish(&event);
            }
        }
        moved
    }

    /// Pick the job in `from` with the smallest `key` and move it to the
    /// state returned by `decide`
    ///
    /// Selection and transition happen under one lock, so a concurrent
    /// cancellation cannot slip in between. `decide` may also update the
    /// record (for example to attach an error).
    pub fn transition_next<K, O, F>(&self, from: J::State, key: K, decide: F) -> Option<J>
    where
        K: Fn(&J) -> O,
        O: Ord,
        F: FnOnce(&mut J) -> J::State,
    {
        let snapshot = {
            let mut jobs = self.jobs.lock();
            let job = jobs
                .values_mut()
                .filter(|job| job.state() == from)
                .min_by_key(|job| key(&**job))?;
            let to = decide(job);
            job.set_state(to, Utc::now());
            job.clone()
        };
        if let Some(event) = snapshot.state_event() {
            self.bus.publish(&event);
        }
        Some(snapshot)
    }

    pub fn remove(&self, id: JobId) -> Option<J> {
        self.jobs.lock().remove(&id)
    }

    /// Snapshots of all records matching `predicate`
    pub fn list_by<P>(&self, predicate: P) -> Vec<J>
    where
        P: Fn(&J) -> bool,
    {
        self.jobs
            .lock()
            .values()
            .filter(|job| predicate(job))
            .cloned()
            .collect()
    }

    pub fn count_in(&self, state: J::State) -> usize {
        self.jobs
            .lock()
            .values()
            .filter(|job| job.state() == state)
            .count()
    }

    /// Drop terminal records finished before `cutoff`; returns how many
    pub fn cleanup(&self, cutoff: DateTime<Utc>) -> usize {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, job| job.finished_at().map_or(true, |at| at >= cutoff));
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
