//! Online/offline soft state with a self-clearing blackout window.
//!
//! The backend marks itself offline when its upstream source stops
//! answering. The flag is soft state: any status read more than the
//! blackout window after the transition clears it back to online as a side
//! effect of the read. There is no recovery timer; staleness is recomputed
//! lazily on every query.

use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Tracing target for reachability transitions.
const OFFLINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::offline");

/// How long an offline marking holds before the next read clears it.
pub const OFFLINE_BLACKOUT: Duration = Duration::from_secs(60);

/// Time source, injectable for tests.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Wall-clock time source used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Backend reachability state toward its upstream identity source.
#[derive(Debug)]
pub struct OfflineStatus<C: Clock = SystemClock> {
    clock: C,
    offline: bool,
    went_offline_at: Option<Instant>,
}

impl OfflineStatus<SystemClock> {
    /// Creates an online status backed by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for OfflineStatus<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> OfflineStatus<C> {
    /// Creates an online status backed by the given clock.
    #[must_use]
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            offline: false,
            went_offline_at: None,
        }
    }

    /// Marks the backend offline and restarts the blackout window.
    ///
    /// Safe to call repeatedly while genuinely offline; each call is an
    /// "at least this offline" signal.
    pub fn mark_offline(&mut self) {
        if !self.offline {
            info!(target: OFFLINE_TARGET, "backend went offline");
        }
        self.offline = true;
        self.went_offline_at = Some(self.clock.now());
    }

    /// Returns the current reachability, clearing stale offline state.
    pub fn is_offline(&mut self) -> bool {
        if self.offline {
            if let Some(went_offline_at) = self.went_offline_at {
                if self.clock.now().duration_since(went_offline_at) >= OFFLINE_BLACKOUT {
                    debug!(target: OFFLINE_TARGET, "offline blackout elapsed, back online");
                    self.offline = false;
                    self.went_offline_at = None;
                }
            }
        }
        self.offline
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[derive(Clone)]
    struct TestClock {
        now: Rc<Cell<Instant>>,
    }

    impl TestClock {
        fn start() -> Self {
            Self {
                now: Rc::new(Cell::new(Instant::now())),
            }
        }

        fn advance(&self, by: Duration) {
            self.now.set(self.now.get() + by);
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.now.get()
        }
    }

    #[test]
    fn starts_online() {
        let mut status = OfflineStatus::with_clock(TestClock::start());
        assert!(!status.is_offline());
    }

    #[test]
    fn repeated_reads_are_idempotent() {
        let clock = TestClock::start();
        let mut status = OfflineStatus::with_clock(clock);
        status.mark_offline();
        assert!(status.is_offline());
        assert!(status.is_offline());
        assert!(status.is_offline());
    }

    #[test]
    fn double_marking_matches_single_marking() {
        let clock = TestClock::start();
        let mut status = OfflineStatus::with_clock(clock.clone());
        status.mark_offline();
        status.mark_offline();
        assert!(status.is_offline());
        clock.advance(Duration::from_secs(61));
        assert!(!status.is_offline());
    }

    #[test]
    fn still_offline_just_inside_the_blackout() {
        let clock = TestClock::start();
        let mut status = OfflineStatus::with_clock(clock.clone());
        status.mark_offline();
        clock.advance(Duration::from_secs(59));
        assert!(status.is_offline());
    }

    #[test]
    fn read_clears_the_flag_after_the_blackout() {
        let clock = TestClock::start();
        let mut status = OfflineStatus::with_clock(clock.clone());
        status.mark_offline();
        clock.advance(Duration::from_secs(61));
        assert!(!status.is_offline());
        // And stays online on the next read.
        assert!(!status.is_offline());
    }

    #[test]
    fn remarking_restarts_the_window() {
        let clock = TestClock::start();
        let mut status = OfflineStatus::with_clock(clock.clone());
        status.mark_offline();
        clock.advance(Duration::from_secs(45));
        status.mark_offline();
        clock.advance(Duration::from_secs(45));
        assert!(status.is_offline());
        clock.advance(Duration::from_secs(16));
        assert!(!status.is_offline());
    }
}
