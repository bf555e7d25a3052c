//! Sliding-window rate limiter.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Caps events inside a sliding time window.
///
/// Timestamps are caller-supplied milliseconds and expected to be
/// non-decreasing; expired entries are discarded from the front on every
/// operation, so each event is stored and removed at most once.
#[derive(Debug)]
pub struct WindowedRateLimiter {
    window_ms: u64,
    max_events: usize,
    events: Mutex<VecDeque<u64>>,
}

impl WindowedRateLimiter {
    /// Creates a limiter allowing `max_events` per `window_ms`.
    ///
    /// # Panics
    ///
    /// Panics if the window is zero.
    #[must_use]
    pub fn new(window_ms: u64, max_events: usize) -> Self {
        assert!(window_ms > 0, "window must be positive");
        Self {
            window_ms,
            max_events,
            events: Mutex::new(VecDeque::new()),
        }
    }

    fn prune(&self, events: &mut VecDeque<u64>, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        while events.front().is_some_and(|&t| t <= cutoff) {
            events.pop_front();
        }
    }

    /// Records an event at `now_ms` if the window has a free slot.
    pub fn try_acquire(&self, now_ms: u64) -> bool {
        let mut events = self.events.lock();
        self.prune(&mut events, now_ms);
        if events.len() < self.max_events {
            events.push_back(now_ms);
            true
        } else {
            false
        }
    }

    /// Events per second over the current window.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn current_rate(&self, now_ms: u64) -> f64 {
        let mut events = self.events.lock();
        self.prune(&mut events, now_ms);
        (events.len() as f64 * 1000.0) / self.window_ms as f64
    }

    /// Remaining admissible events in the current window.
    #[must_use]
    pub fn available_slots(&self, now_ms: u64) -> usize {
        let mut events = self.events.lock();
        self.prune(&mut events, now_ms);
        self.max_events.saturating_sub(events.len())
    }

    /// Forgets all recorded events.
    pub fn reset(&self) {
        self.events.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_events_in_window() {
        let limiter = WindowedRateLimiter::new(1000, 3);
        assert!(limiter.try_acquire(0));
        assert!(limiter.try_acquire(100));
        assert!(limiter.try_acquire(200));
        assert!(!limiter.try_acquire(300));
    }

    #[test]
    fn test_slots_free_as_window_slides() {
        let limiter = WindowedRateLimiter::new(1000, 2);
        assert!(limiter.try_acquire(0));
        assert!(limiter.try_acquire(500));
        assert!(!limiter.try_acquire(900));
        // t=0 falls out of [t−1000, t] at t=1001.
        assert!(limiter.try_acquire(1001));
    }

    #[test]
    fn test_window_bound_holds_under_burst() {
        // At any probe time, at most max_events acquisitions succeeded in
        // the trailing window.
        let limiter = WindowedRateLimiter::new(100, 5);
        let mut accepted: Vec<u64> = Vec::new();
        for t in (0..1000).step_by(7) {
            if limiter.try_acquire(t) {
                accepted.push(t);
            }
        }
        for &t in &accepted {
            let in_window = accepted
                .iter()
                .filter(|&&s| s <= t && s + 100 > t)
                .count();
            assert!(in_window <= 5, "window at t={t} held {in_window}");
        }
    }

    #[test]
    fn test_current_rate_and_slots() {
        let limiter = WindowedRateLimiter::new(1000, 10);
        assert!(limiter.try_acquire(0));
        assert!(limiter.try_acquire(10));
        assert!((limiter.current_rate(20) - 2.0).abs() < f64::EPSILON);
        assert_eq!(limiter.available_slots(20), 8);
    }

    #[test]
    fn test_reset() {
        let limiter = WindowedRateLimiter::new(1000, 1);
        assert!(limiter.try_acquire(0));
        assert!(!limiter.try_acquire(1));
        limiter.reset();
        assert!(limiter.try_acquire(2));
    }
}
