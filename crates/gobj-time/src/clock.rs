//! Clocks for timer deadlines

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic time source. `now` is the time elapsed since the clock's origin.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall-clock time driven by the OS monotonic clock
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock moved by hand, for tests and simulations.
/// INVARIANT: never goes backwards
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock::default()
    }

    /// Advance by `dt` and return the new time
    pub fn advance(&self, dt: Duration) -> Duration {
        let mut now = self.now.lock();
        *now = now.saturating_add(dt);
        *now
    }

    pub fn advance_ms(&self, ms: u64) -> Duration {
        self.advance(Duration::from_millis(ms))
    }

    /// Jump to `target`. Earlier targets are ignored.
    pub fn set(&self, target: Duration) {
        let mut now = self.now.lock();
        if target > *now {
            *now = target;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock::new();
        let t1 = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        assert!(clock.now() > t1);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        assert_eq!(clock.advance_ms(250), Duration::from_millis(250));
        clock.set(Duration::from_millis(100));
        assert_eq!(clock.now(), Duration::from_millis(250));
        clock.set(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(1));
    }

    proptest! {
        #[test]
        fn prop_manual_clock_monotonic(steps in proptest::collection::vec(0u64..10_000, 1..50)) {
            let clock = ManualClock::new();
            let mut last = clock.now();
            for ms in steps {
                let now = clock.advance_ms(ms);
                prop_assert!(now >= last);
                last = now;
            }
        }
    }
}
