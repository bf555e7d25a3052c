//! Target-latency adaptive rate controller.

use std::time::Duration;

use parking_lot::Mutex;

/// Default proportional gain for rate adjustments.
pub const DEFAULT_GAIN: f64 = 0.2;

/// Adjusts an admissible rate toward a latency target.
///
/// After each latency observation the rate moves by a fraction of the
/// relative error: `rate ← clamp(rate · (1 + gain · error / target))`
/// where `error = target − observed`. Latency under target grows the
/// rate; latency over target shrinks it.
#[derive(Debug)]
pub struct AdaptiveBackpressure {
    rate: Mutex<f64>,
    target_latency_ms: f64,
    min_rate: f64,
    max_rate: f64,
    gain: f64,
}

impl AdaptiveBackpressure {
    /// Creates a controller with the default gain.
    ///
    /// Rates are items per second; `target_latency_ms` must be positive.
    ///
    /// # Panics
    ///
    /// Panics if `target_latency_ms` is not positive or the rate bounds
    /// are inverted.
    #[must_use]
    pub fn new(initial_rate: f64, target_latency_ms: f64, min_rate: f64, max_rate: f64) -> Self {
        Self::with_gain(initial_rate, target_latency_ms, min_rate, max_rate, DEFAULT_GAIN)
    }

    /// Creates a controller with an explicit gain in `[0, 1]`.
    ///
    /// # Panics
    ///
    /// Panics on non-positive target latency, inverted rate bounds, or a
    /// gain outside `[0, 1]`.
    #[must_use]
    pub fn with_gain(
        initial_rate: f64,
        target_latency_ms: f64,
        min_rate: f64,
        max_rate: f64,
        gain: f64,
    ) -> Self {
        assert!(target_latency_ms > 0.0, "target latency must be positive");
        assert!(min_rate <= max_rate, "min rate must not exceed max rate");
        assert!((0.0..=1.0).contains(&gain), "gain must be within [0, 1]");

        Self {
            rate: Mutex::new(initial_rate.clamp(min_rate, max_rate)),
            target_latency_ms,
            min_rate,
            max_rate,
            gain,
        }
    }

    /// Feeds one latency observation into the controller.
    pub fn update(&self, observed_latency_ms: f64) {
        let error = self.target_latency_ms - observed_latency_ms;
        let adjustment = self.gain * error / self.target_latency_ms;

        let mut rate = self.rate.lock();
        *rate = (*rate * (1.0 + adjustment)).clamp(self.min_rate, self.max_rate);
    }

    /// Returns the current admissible rate in items per second.
    #[must_use]
    pub fn rate(&self) -> f64 {
        *self.rate.lock()
    }

    /// Returns the latency target.
    #[must_use]
    pub fn target_latency_ms(&self) -> f64 {
        self.target_latency_ms
    }

    /// Returns true when the observed throughput exceeds the admissible
    /// rate.
    #[must_use]
    pub fn should_throttle(&self, current_throughput: f64) -> bool {
        current_throughput > self.rate()
    }

    /// Inter-item delay implied by the current rate, in milliseconds.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_ms(&self) -> u64 {
        let rate = self.rate();
        if rate > 0.0 {
            (1000.0 / rate) as u64
        } else {
            u64::MAX
        }
    }

    /// Inter-item delay implied by the current rate.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms())
    }
}
