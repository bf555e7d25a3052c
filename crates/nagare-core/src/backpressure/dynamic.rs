//! Composite admission policy.

use tracing::debug;

use super::adaptive::AdaptiveBackpressure;

/// A snapshot of the load the admission policy judges against.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadMetrics {
    /// Items queued and not yet processed.
    pub queue_size: usize,
    /// Items per second leaving the queue.
    pub processing_rate: f64,
    /// Items per second arriving.
    pub input_rate: f64,
    /// End-to-end latency of the most recent item, in milliseconds.
    pub latency_ms: f64,
    /// Bytes of queue memory in use.
    pub memory_usage: usize,
}

/// Why an item was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The queue reached its configured bound.
    QueueFull,
    /// Latency ran past twice the target.
    LatencyExceeded,
    /// The input rate exceeds the adaptive admissible rate.
    Throttled,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitDecision {
    /// Admit the item.
    Accept,
    /// Reject the item for the given reason.
    Reject(RejectReason),
}

impl AdmitDecision {
    /// Returns true for [`AdmitDecision::Accept`].
    #[must_use]
    pub fn is_accept(&self) -> bool {
        matches!(self, AdmitDecision::Accept)
    }
}

/// Admission control combining queue depth, latency, and the adaptive
/// rate controller.
///
/// Every check - accepted or rejected - feeds the observed latency back
/// into the adaptive controller, so the admissible rate tracks reality
/// even while shedding load.
#[derive(Debug)]
pub struct DynamicBackpressure {
    adaptive: AdaptiveBackpressure,
    max_queue: usize,
    target_latency_ms: f64,
}

impl DynamicBackpressure {
    /// Creates a policy bounded by `max_queue` items and targeting
    /// `target_latency_ms`, judged by the given adaptive controller.
    #[must_use]
    pub fn new(max_queue: usize, target_latency_ms: f64, adaptive: AdaptiveBackpressure) -> Self {
        Self {
            adaptive,
            max_queue,
            target_latency_ms,
        }
    }

    /// Judges one admission against the current load.
    pub fn admit(&self, metrics: &LoadMetrics) -> AdmitDecision {
        let decision = if metrics.queue_size >= self.max_queue {
            AdmitDecision::Reject(RejectReason::QueueFull)
        } else if metrics.latency_ms > 2.0 * self.target_latency_ms {
            AdmitDecision::Reject(RejectReason::LatencyExceeded)
        } else if self.adaptive.should_throttle(metrics.input_rate) {
            AdmitDecision::Reject(RejectReason::Throttled)
        } else {
            AdmitDecision::Accept
        };

        // Feedback on both paths keeps the rate tracking observed load.
        self.adaptive.update(metrics.latency_ms);

        if let AdmitDecision::Reject(reason) = decision {
            debug!(
                ?reason,
                queue_size = metrics.queue_size,
                latency_ms = metrics.latency_ms,
                input_rate = metrics.input_rate,
                "admission rejected"
            );
        }
        decision
    }

    /// Returns the adaptive controller's current admissible rate.
    #[must_use]
    pub fn current_rate(&self) -> f64 {
        self.adaptive.rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DynamicBackpressure {
        DynamicBackpressure::new(100, 10.0, AdaptiveBackpressure::new(50.0, 10.0, 1.0, 1000.0))
    }

    fn calm_metrics() -> LoadMetrics {
        LoadMetrics {
            queue_size: 5,
            processing_rate: 40.0,
            input_rate: 20.0,
            latency_ms: 8.0,
            memory_usage: 1024,
        }
    }

    #[test]
    fn test_accepts_under_calm_load() {
        assert!(policy().admit(&calm_metrics()).is_accept());
    }

    #[test]
    fn test_rejects_on_full_queue() {
        let metrics = LoadMetrics {
            queue_size: 100,
            ..calm_metrics()
        };
        assert_eq!(
            policy().admit(&metrics),
            AdmitDecision::Reject(RejectReason::QueueFull)
        );
    }

    #[test]
    fn test_rejects_on_latency_blowout() {
        let metrics = LoadMetrics {
            latency_ms: 21.0,
            ..calm_metrics()
        };
        assert_eq!(
            policy().admit(&metrics),
            AdmitDecision::Reject(RejectReason::LatencyExceeded)
        );
    }

    #[test]
    fn test_rejects_on_throttle() {
        let metrics = LoadMetrics {
            input_rate: 500.0,
            ..calm_metrics()
        };
        assert_eq!(
            policy().admit(&metrics),
            AdmitDecision::Reject(RejectReason::Throttled)
        );
    }

    #[test]
    fn test_rejection_still_feeds_adaptive_controller() {
        let policy = policy();
        let before = policy.current_rate();
        let metrics = LoadMetrics {
            queue_size: 100,
            latency_ms: 2.0,
            ..calm_metrics()
        };
        let _ = policy.admit(&metrics);
        // Latency far under target: the rate must have grown even though
        // the item was rejected.
        assert!(policy.current_rate() > before);
    }
}
