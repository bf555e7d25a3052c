//! Keyed credit controllers for hosts multiplexing many streams.

use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::RwLock;

use super::credit::CreditController;

/// Per-stream credit controllers behind one keyed map.
///
/// Registration hands each stream its own [`CreditController`]; consume
/// and grant operations address streams by id. Unknown ids consume
/// nothing and count as exhausted.
pub struct MultiStreamCreditManager {
    streams: RwLock<FxHashMap<String, Arc<CreditController>>>,
    default_credits: i64,
}

impl MultiStreamCreditManager {
    /// Creates a manager handing `default_credits` to newly registered
    /// streams.
    #[must_use]
    pub fn new(default_credits: i64) -> Self {
        Self {
            streams: RwLock::new(FxHashMap::default()),
            default_credits,
        }
    }

    /// Registers a stream, replacing any existing controller under the
    /// same id. `initial` overrides the manager default.
    pub fn register(&self, stream_id: &str, initial: Option<i64>) {
        let credits = initial.unwrap_or(self.default_credits);
        self.streams.write().insert(
            stream_id.to_owned(),
            Arc::new(CreditController::new(credits)),
        );
    }

    /// Removes a stream's controller.
    pub fn unregister(&self, stream_id: &str) {
        self.streams.write().remove(stream_id);
    }

    /// Returns the controller for a stream, if registered.
    #[must_use]
    pub fn controller(&self, stream_id: &str) -> Option<Arc<CreditController>> {
        self.streams.read().get(stream_id).cloned()
    }

    /// Consumes credits from one stream. Unknown ids return false.
    pub fn try_consume(&self, stream_id: &str, amount: i64) -> bool {
        self.controller(stream_id)
            .is_some_and(|c| c.try_consume(amount))
    }

    /// Grants credits to one stream. Unknown ids are ignored.
    pub fn grant(&self, stream_id: &str, amount: i64) {
        if let Some(controller) = self.controller(stream_id) {
            controller.grant(amount);
        }
    }

    /// Returns a stream's balance, if registered.
    #[must_use]
    pub fn available(&self, stream_id: &str) -> Option<i64> {
        self.controller(stream_id).map(|c| c.available())
    }

    /// Returns true when the stream has no credits (or is unknown).
    #[must_use]
    pub fn is_exhausted(&self, stream_id: &str) -> bool {
        self.controller(stream_id).map_or(true, |c| c.is_exhausted())
    }

    /// Returns the registered stream ids, unordered.
    #[must_use]
    pub fn active_streams(&self) -> Vec<String> {
        self.streams.read().keys().cloned().collect()
    }

    /// Sums the balances across every registered stream.
    #[must_use]
    pub fn total_available(&self) -> i64 {
        self.streams
            .read()
            .values()
            .map(|c| c.available())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_consume_grant() {
        let manager = MultiStreamCreditManager::new(8);
        manager.register("a", None);
        manager.register("b", Some(2));

        assert_eq!(manager.available("a"), Some(8));
        assert_eq!(manager.available("b"), Some(2));

        assert!(manager.try_consume("a", 3));
        manager.grant("b", 1);
        assert_eq!(manager.total_available(), 5 + 3);
    }

    #[test]
    fn test_unknown_stream() {
        let manager = MultiStreamCreditManager::new(4);
        assert!(!manager.try_consume("ghost", 1));
        assert!(manager.is_exhausted("ghost"));
        assert_eq!(manager.available("ghost"), None);
    }

    #[test]
    fn test_unregister() {
        let manager = MultiStreamCreditManager::new(4);
        manager.register("a", None);
        assert_eq!(manager.active_streams(), vec!["a".to_owned()]);

        manager.unregister("a");
        assert!(manager.active_streams().is_empty());
        assert_eq!(manager.total_available(), 0);
    }

    #[test]
    fn test_exhaustion_per_stream() {
        let manager = MultiStreamCreditManager::new(1);
        manager.register("a", None);
        assert!(!manager.is_exhausted("a"));
        assert!(manager.try_consume("a", 1));
        assert!(manager.is_exhausted("a"));
    }
}
