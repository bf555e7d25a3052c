//! Atomic credit accounting with async waiters.

use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::Notify;

/// Upper bound on accumulated credits.
///
/// Grants saturate here so a runaway granter cannot overflow the counter.
pub const MAX_CREDITS: i64 = i64::MAX / 2;

/// A credit counter shared between one producer and one consumer side.
///
/// `try_consume` and `grant` are lock-free; `consume` parks the caller on
/// a notifier until enough credits arrive.
#[derive(Debug)]
pub struct CreditController {
    available: AtomicI64,
    initial: i64,
    notify: Notify,
}

impl CreditController {
    /// Creates a controller holding `initial` credits.
    ///
    /// # Panics
    ///
    /// Panics if `initial` is negative.
    #[must_use]
    pub fn new(initial: i64) -> Self {
        assert!(initial >= 0, "initial credits must be non-negative");
        Self {
            available: AtomicI64::new(initial.min(MAX_CREDITS)),
            initial: initial.min(MAX_CREDITS),
            notify: Notify::new(),
        }
    }

    /// Consumes `amount` credits if available. Never blocks.
    pub fn try_consume(&self, amount: i64) -> bool {
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current >= amount).then(|| current - amount)
            })
            .is_ok()
    }

    /// Consumes `amount` credits, waiting until enough are granted.
    pub async fn consume(&self, amount: i64) {
        loop {
            if self.try_consume(amount) {
                return;
            }
            // Register before re-checking so a grant between the check
            // and the await cannot be missed.
            let notified = self.notify.notified();
            if self.try_consume(amount) {
                return;
            }
            notified.await;
        }
    }

    /// Grants `amount` credits, saturating at [`MAX_CREDITS`], and wakes
    /// waiters.
    pub fn grant(&self, amount: i64) {
        let _ = self
            .available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(amount).min(MAX_CREDITS))
            });
        self.notify.notify_waiters();
    }

    /// Restores the initial credit balance and wakes waiters.
    pub fn reset(&self) {
        self.available.store(self.initial, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Returns the current balance.
    #[must_use]
    pub fn available(&self) -> i64 {
        self.available.load(Ordering::Acquire)
    }

    /// Returns the configured initial balance.
    #[must_use]
    pub fn initial(&self) -> i64 {
        self.initial
    }

    /// Returns true when no credits remain.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.available() == 0
    }

    /// Returns true when at least one credit remains.
    #[must_use]
    pub fn has_credits(&self) -> bool {
        self.available() > 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_consume_and_grant() {
        let credits = CreditController::new(4);
        assert!(credits.try_consume(3));
        assert_eq!(credits.available(), 1);
        assert!(!credits.try_consume(2));
        credits.grant(5);
        assert!(credits.try_consume(2));
        assert_eq!(credits.available(), 4);
    }

    #[test]
    fn test_exhaustion_and_reset() {
        let credits = CreditController::new(2);
        assert!(credits.has_credits());
        assert!(credits.try_consume(2));
        assert!(credits.is_exhausted());
        credits.reset();
        assert_eq!(credits.available(), 2);
    }

    #[test]
    fn test_grant_saturates() {
        let credits = CreditController::new(1);
        credits.grant(i64::MAX);
        assert_eq!(credits.available(), MAX_CREDITS);
    }

    #[test]
    fn test_credit_conservation() {
        // granted − consumed == available − initial, over any run.
        let credits = CreditController::new(10);
        let mut granted: i64 = 0;
        let mut consumed: i64 = 0;

        for i in 0..100 {
            let n = i % 7 + 1;
            if i % 3 == 0 {
                credits.grant(n);
                granted += n;
            } else if credits.try_consume(n) {
                consumed += n;
            }
        }

        assert_eq!(granted - consumed, credits.available() - credits.initial());
    }

    #[tokio::test]
    async fn test_consume_waits_for_grant() {
        let credits = Arc::new(CreditController::new(0));
        let waiter = Arc::clone(&credits);
        let task = tokio::spawn(async move {
            waiter.consume(3).await;
            waiter.available()
        });

        tokio::task::yield_now().await;
        credits.grant(1);
        tokio::task::yield_now().await;
        credits.grant(2);

        assert_eq!(task.await.unwrap(), 0);
    }
}
