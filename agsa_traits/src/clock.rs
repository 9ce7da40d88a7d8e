use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source behind the stack's watchdogs and retry timing.
///
/// Everything that waits or measures goes through this trait, so a test can
/// swap in [`test_clock::TestClock`] and step through timer expiries without
/// real sleeps.
pub trait Clock {
    /// Current instant on the clock's timeline.
    fn now(&self) -> Instant;

    /// Wait out `d`. Simulated clocks advance their timeline instead of
    /// blocking.
    fn sleep(&self, d: Duration);
}

/// Real-time clock over `Instant::now` and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        thread::sleep(d);
    }
}

pub mod test_clock {
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use super::Clock;

    /// Clock whose time only moves when the test says so.
    ///
    /// Reports a fixed origin plus an adjustable offset; `sleep` advances the
    /// offset rather than blocking. Clones share the offset, so a controller
    /// and the test driving it observe the same timeline. Deliberately not
    /// test-gated: downstream crates use it from their integration tests.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        /// Move time forward by `d`.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        /// Jump to `origin + d`, wherever the clock currently stands.
        pub fn set_offset(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = d;
            }
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            let off = self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO);
            self.origin + off
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }
}
