//! Explicit timer scheduling for the cooperative, single-threaded core.
//!
//! Components own a `TimerSet` keyed by their own token enum and drive it from
//! the shared `Clock`. Arming an already-armed token replaces its deadline
//! (rearm-on-start semantics). There are no threads and no callbacks; due
//! tokens are drained by the component's own update entry point.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct TimerSet<T: Copy + Eq> {
    armed: Vec<(T, Instant)>,
}

impl<T: Copy + Eq> Default for TimerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Eq> TimerSet<T> {
    pub fn new() -> Self {
        Self { armed: Vec::new() }
    }

    /// Arm `token` to fire `after` the given `now`. Replaces any existing
    /// deadline for the same token.
    pub fn arm(&mut self, token: T, after: Duration, now: Instant) {
        self.disarm(token);
        self.armed.push((token, now + after));
    }

    pub fn disarm(&mut self, token: T) {
        self.armed.retain(|(t, _)| *t != token);
    }

    pub fn disarm_all(&mut self) {
        self.armed.clear();
    }

    pub fn is_armed(&self, token: T) -> bool {
        self.armed.iter().any(|(t, _)| *t == token)
    }

    /// Remove and return all tokens whose deadline is at or before `now`,
    /// ordered by deadline.
    pub fn take_due(&mut self, now: Instant) -> Vec<T> {
        let mut due: Vec<(T, Instant)> = Vec::new();
        self.armed.retain(|entry| {
            if entry.1 <= now {
                due.push(*entry);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(_, deadline)| *deadline);
        due.into_iter().map(|(t, _)| t).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Tok {
        A,
        B,
    }

    #[test]
    fn arm_replaces_existing_deadline() {
        let now = Instant::now();
        let mut timers = TimerSet::new();
        timers.arm(Tok::A, Duration::from_millis(10), now);
        timers.arm(Tok::A, Duration::from_millis(100), now);
        assert!(timers.take_due(now + Duration::from_millis(50)).is_empty());
        assert_eq!(
            timers.take_due(now + Duration::from_millis(100)),
            vec![Tok::A]
        );
    }

    #[test]
    fn due_tokens_drain_in_deadline_order() {
        let now = Instant::now();
        let mut timers = TimerSet::new();
        timers.arm(Tok::B, Duration::from_millis(20), now);
        timers.arm(Tok::A, Duration::from_millis(10), now);
        assert_eq!(
            timers.take_due(now + Duration::from_millis(30)),
            vec![Tok::A, Tok::B]
        );
        assert!(timers.take_due(now + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn disarm_is_idempotent() {
        let now = Instant::now();
        let mut timers = TimerSet::new();
        timers.arm(Tok::A, Duration::from_millis(10), now);
        timers.disarm(Tok::A);
        timers.disarm(Tok::A);
        assert!(!timers.is_armed(Tok::A));
        assert!(timers.take_due(now + Duration::from_secs(1)).is_empty());
    }
}
