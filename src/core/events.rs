//! In-process event bus
//!
//! Broadcasts job lifecycle and progress events to observers (terminal
//! output, logging, the packaging scheduler itself).
//!
//! Delivery is synchronous and fire-and-forget: handlers run in
//! registration order on the publishing thread, and a panicking handler is
//! logged and skipped without affecting later handlers or the publisher.
//!
//! Topics are dotted strings (`packaging.started`). A subscription pattern is
//! either an exact topic, a `prefix.*` wildcard, or `*` for everything.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::core::job::{BuildOutcome, JobId, SourceIdentity, TargetIdentity};

/// Typed event payloads, one variant per topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "camelCase")]
pub enum SchedulerEvent {
    #[serde(rename = "extraction.started", rename_all = "camelCase")]
    ExtractionStarted { job_id: JobId, source: SourceIdentity },

    #[serde(rename = "extraction.completed", rename_all = "camelCase")]
    ExtractionCompleted { job_id: JobId, source: SourceIdentity },

    #[serde(rename = "extraction.failed", rename_all = "camelCase")]
    ExtractionFailed {
        job_id: JobId,
        source: SourceIdentity,
        error: String,
    },

    #[serde(rename = "packaging.queued", rename_all = "camelCase")]
    PackagingQueued {
        job_id: JobId,
        target: TargetIdentity,
        priority: i32,
    },

    #[serde(rename = "packaging.ready", rename_all = "camelCase")]
    PackagingReady { job_id: JobId },

    #[serde(rename = "packaging.started", rename_all = "camelCase")]
    PackagingStarted { job_id: JobId },

    #[serde(rename = "packaging.progress", rename_all = "camelCase")]
    PackagingProgress {
        job_id: JobId,
        percent: u8,
        message: String,
    },

    #[serde(rename = "packaging.completed", rename_all = "camelCase")]
    PackagingCompleted { job_id: JobId, result: BuildOutcome },

    #[serde(rename = "packaging.failed", rename_all = "camelCase")]
    PackagingFailed { job_id: JobId, error: String },

    #[serde(rename = "packaging.cancelled", rename_all = "camelCase")]
    PackagingCancelled { job_id: JobId },
}

impl SchedulerEvent {
    /// Topic string this event is published under
    pub fn topic(&self) -> &'static str {
        match self {
            Self::ExtractionStarted { .. } => "extraction.started",
            Self::ExtractionCompleted { .. } => "extraction.completed",
            Self::ExtractionFailed { .. } => "extraction.failed",
            Self::PackagingQueued { .. } => "packaging.queued",
            Self::PackagingReady { .. } => "packaging.ready",
            Self::PackagingStarted { .. } => "packaging.started",
            Self::PackagingProgress { .. } => "packaging.progress",
            Self::PackagingCompleted { .. } => "packaging.completed",
            Self::PackagingFailed { .. } => "packaging.failed",
            Self::PackagingCancelled { .. } => "packaging.cancelled",
        }
    }

    /// Job the event refers to
    pub fn job_id(&self) -> JobId {
        match self {
            Self::ExtractionStarted { job_id, .. }
            | Self::ExtractionCompleted { job_id, .. }
            | Self::ExtractionFailed { job_id, .. }
            | Self::PackagingQueued { job_id, .. }
            | Self::PackagingReady { job_id }
            | Self::PackagingStarted { job_id }
            | Self::PackagingProgress { job_id, .. }
            | Self::PackagingCompleted { job_id, .. }
            | Self::PackagingFailed { job_id, .. }
            | Self::PackagingCancelled { job_id } => *job_id,
        }
    }
}

/// Event handler callback
pub type EventHandler = Arc<dyn Fn(&SchedulerEvent) + Send + Sync>;

struct Registration {
    id: u64,
    pattern: String,
    handler: EventHandler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Registration>,
}

/// Publish/subscribe channel for scheduler events
///
/// Cloning is cheap and clones share subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every event whose topic matches `pattern`
    ///
    /// Dropping the returned [`Subscription`] does not unsubscribe; call
    /// [`Subscription::unsubscribe`] explicitly.
    pub fn subscribe<F>(&self, pattern: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&SchedulerEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.entries.push(Registration {
            id,
            pattern: pattern.into(),
            handler: Arc::new(handler),
        });
        Subscription {
            id,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Deliver `event` to all matching subscribers in registration order
    pub fn publish(&self, event: &SchedulerEvent) {
        let topic = event.topic();
        // Snapshot so handlers may subscribe or publish re-entrantly.
        let handlers: Vec<EventHandler> = self
            .registry
            .lock()
            .entries
            .iter()
            .filter(|r| topic_matches(&r.pattern, topic))
            .map(|r| Arc::clone(&r.handler))
            .collect();

        tracing::trace!(topic, subscribers = handlers.len(), "publishing event");

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::warn!(topic, "event handler panicked; continuing delivery");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().entries.len()
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Arc<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the handler; returns false if it was already removed
    pub fn unsubscribe(self) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.entries.len();
        registry.entries.retain(|r| r.id != self.id);
        registry.entries.len() != before
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix(".*") {
        Some(prefix) => topic
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.')),
        None => pattern == topic,
    }
}
