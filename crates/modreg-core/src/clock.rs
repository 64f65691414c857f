//! Time sources for timelock evaluation.
//!
//! The registry never schedules callbacks. A pending upgrade stores its
//! deadline and `execute` compares it against [`Clock::now`] at call time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of the current time in UNIX seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// A manually driven clock.
///
/// Clones share the same underlying time, so a test can hand one clone to the
/// registry and advance another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(100);
        let handle = clock.clone();
        handle.advance(50);
        assert_eq!(clock.now(), 150);
        handle.set(10);
        assert_eq!(clock.now(), 10);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
