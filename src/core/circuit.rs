//! Per-target failure circuit
//!
//! Tracks recent build failures per target and reports the target as open
//! once enough failures land inside the sliding window. The window is
//! evaluated at query time; there is no timer. A success resets the target.
//!
//! This is advisory backpressure: it keeps a reliably failing target from
//! occupying packaging slots, nothing more.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::config::defaults;

/// Circuit thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitConfig {
    /// Failures are counted if younger than this
    pub window: Duration,
    /// Failures within the window that open the circuit
    pub threshold: usize,
    /// Timestamps older than this are dropped on write
    pub retention: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(defaults::FAILURE_WINDOW_MS),
            threshold: defaults::FAILURE_THRESHOLD,
            retention: Duration::from_millis(defaults::FAILURE_RETENTION_MS),
        }
    }
}

/// Failure and success history of one target
#[derive(Debug, Clone, Default)]
struct FailureRecord {
    failures: VecDeque<Instant>,
    successes: VecDeque<Instant>,
}

impl FailureRecord {
    fn prune(&mut self, now: Instant, retention: Duration) {
        let expired = |at: &Instant| now.saturating_duration_since(*at) > retention;
        while self.failures.front().is_some_and(expired) {
            self.failures.pop_front();
        }
        while self.successes.front().is_some_and(expired) {
            self.successes.pop_front();
        }
    }

    fn failures_within(&self, now: Instant, window: Duration) -> usize {
        self.failures
            .iter()
            .filter(|at| now.saturating_duration_since(**at) <= window)
            .count()
    }
}

/// Sliding-window failure tracker keyed by target
#[derive(Debug, Default)]
pub struct FailureCircuit {
    config: CircuitConfig,
    records: Mutex<HashMap<String, FailureRecord>>,
}

impl FailureCircuit {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> CircuitConfig {
        self.config
    }

    /// Whether dispatch for `target` is currently suspended
    pub fn is_open(&self, target: &str) -> bool {
        self.is_open_at(target, Instant::now())
    }

    pub fn is_open_at(&self, target: &str, now: Instant) -> bool {
        self.failure_count_at(target, now) >= self.config.threshold.max(1)
    }

    /// Failures for `target` inside the window
    pub fn failure_count(&self, target: &str) -> usize {
        self.failure_count_at(target, Instant::now())
    }

    pub fn failure_count_at(&self, target: &str, now: Instant) -> usize {
        self.records
            .lock()
            .get(target)
            .map_or(0, |record| record.failures_within(now, self.config.window))
    }

    pub fn record_failure(&self, target: &str) {
        self.record_failure_at(target, Instant::now());
    }

    pub fn record_failure_at(&self, target: &str, now: Instant) {
        let mut records = self.records.lock();
        let record = records.entry(target.to_string()).or_default();
        record.failures.push_back(now);
        record.prune(now, self.config.retention);

        let recent = record.failures_within(now, self.config.window);
        if recent >= self.config.threshold.max(1) {
            tracing::warn!(target_key = target, recent, "failure circuit open");
        }
    }

    /// Record a success; clears the target's failure history
    pub fn record_success(&self, target: &str) {
        self.record_success_at(target, Instant::now());
    }

    pub fn record_success_at(&self, target: &str, now: Instant) {
        let mut records = self.records.lock();
        let record = records.entry(target.to_string()).or_default();
        if !record.failures.is_empty() {
            tracing::debug!(target_key = target, "failure circuit reset");
        }
        record.failures.clear();
        record.successes.push_back(now);
        record.prune(now, self.config.retention);
    }
}
