//! Dispatch loop coordination
//!
//! A dispatch request may arrive from a submission, a completion callback,
//! or an event handler running inside another dispatch pass. The gate runs
//! at most one pass at a time; requests that arrive while a pass is running
//! are folded into one more pass by the runner instead of blocking.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Single-runner gate plus the in-flight counter of one scheduler
#[derive(Debug, Default)]
pub struct DispatchGate {
    running: AtomicBool,
    pending: AtomicBool,
    in_flight: AtomicUsize,
}

impl DispatchGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `pass` until no further dispatch was requested
    ///
    /// Returns immediately if another caller is already running passes; that
    /// caller will pick up this request.
    pub fn run<F>(&self, mut pass: F)
    where
        F: FnMut(),
    {
        self.pending.store(true, Ordering::SeqCst);
        loop {
            if self.running.swap(true, Ordering::SeqCst) {
                return;
            }
            while self.pending.swap(false, Ordering::SeqCst) {
                pass();
            }
            self.running.store(false, Ordering::SeqCst);
            if !self.pending.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    /// External calls currently outstanding
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Claim a slot; only called from inside a pass
    pub fn acquire(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    /// Return a slot after an external call finished
    pub fn release(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "released more slots than acquired");
    }
}
