//! # Clock Source
//!
//! The treasury never advances time itself. Every timelock decision is a
//! comparison against whatever the host's [`Clock`] reports, which is what
//! makes maturity survive host downtime: a change queued before a restart
//! is evaluated against wall-clock time after it, not against an in-process
//! timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::Timestamp;

/// A monotonic source of "now" in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time from the operating system (UTC).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // Pre-epoch clocks are a host misconfiguration; clamp rather than wrap.
        chrono::Utc::now().timestamp().max(0) as Timestamp
    }
}

/// A hand-driven clock for tests and simulations.
///
/// Clones share the same underlying time, so a test can hand one copy to
/// the treasury and keep another to advance.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Moves time forward by `secs`.
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Jumps to an absolute time. Refuses to go backwards.
    pub fn set(&self, at: Timestamp) {
        self.now.fetch_max(at, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Lets hosts pick the clock at runtime and share it between components.
impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(1_000);
        let handle = clock.clone();
        handle.advance(50);
        assert_eq!(clock.now(), 1_050);
    }

    #[test]
    fn shared_clock_delegates() {
        let clock = ManualClock::new(7);
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        clock.advance(3);
        assert_eq!(shared.now(), 10);
    }

    #[test]
    fn manual_clock_never_goes_backwards() {
        let clock = ManualClock::new(1_000);
        clock.set(500);
        assert_eq!(clock.now(), 1_000);
        clock.set(2_000);
        assert_eq!(clock.now(), 2_000);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
