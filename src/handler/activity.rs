//! Background activity tracking for health reporting
//!
//! A handler that spawns work outliving its response (an async task started
//! from a single-value invocation, for example) marks it with an
//! [`ActivityGuard`]. While any guard is alive, `/ping` reports
//! `HealthyBusy` so the runtime does not recycle the host mid-task.
//!
//! ```text
//! handler ──track_activity("index")──► ActivityGuard ──(drop)──► counter - 1
//!                                           │
//!                                    counter + 1
//!                                           │
//! /ping ──is_busy()?──► Healthy | HealthyBusy
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Process-wide count of in-progress background activities.
///
/// Cloning shares the counter. This is the only state the server shares
/// between invocations, and it is only ever read by the health check.
#[derive(Debug, Clone, Default)]
pub struct ActivityTracker {
    active: Arc<AtomicUsize>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity; it stays active until the guard is dropped
    pub fn begin(&self, name: impl Into<String>) -> ActivityGuard {
        let name = name.into();
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(activity = %name, active = now_active, "Activity started");
        ActivityGuard {
            active: Arc::clone(&self.active),
            name,
        }
    }

    /// Number of activities currently in progress
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.active() > 0
    }
}

/// RAII marker for one background activity
#[derive(Debug)]
pub struct ActivityGuard {
    active: Arc<AtomicUsize>,
    name: String,
}

impl ActivityGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        let remaining = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::debug!(activity = %self.name(), active = remaining, "Activity finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_counts_until_dropped() {
        let tracker = ActivityTracker::new();
        assert!(!tracker.is_busy());

        let first = tracker.begin("index");
        let second = tracker.begin("upload");
        assert_eq!(tracker.active(), 2);
        assert_eq!(first.name(), "index");

        drop(first);
        assert_eq!(tracker.active(), 1);
        assert!(tracker.is_busy());

        drop(second);
        assert!(!tracker.is_busy());
    }

    #[test]
    fn test_clones_share_counter() {
        let tracker = ActivityTracker::new();
        let clone = tracker.clone();
        let _guard = clone.begin("shared");
        assert_eq!(tracker.active(), 1);
    }
}
