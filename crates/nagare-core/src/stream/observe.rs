//! Callback-driven consumption.
//!
//! [`Stream::observe`] drives a pipeline from a background task and hands
//! each emission to a callback, with completion and error callbacks and a
//! cancellable [`Subscription`] handle. This is the push-style surface
//! transport hosts build on; pull-style consumers use the finalizers or
//! [`Stream::into_stream`] instead.

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::StreamError;
use crate::time::CancelToken;
use crate::value::Value;

use super::Stream;

/// Handle to an active [`Stream::observe`] subscription.
///
/// Dropping the handle does **not** cancel the subscription; call
/// [`cancel`](Subscription::cancel) to stop it. After cancellation no
/// further callbacks run.
#[derive(Debug)]
pub struct Subscription {
    token: CancelToken,
    driver: JoinHandle<()>,
}

impl Subscription {
    /// Requests cancellation; the driver task stops between emissions.
    pub fn cancel(&self) {
        self.token.cancel();
        self.driver.abort();
    }

    /// Returns true while the subscription has not been cancelled or
    /// completed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.driver.is_finished()
    }

    /// Returns a token observers can use to tie other work to this
    /// subscription's lifetime.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Waits for the subscription to finish (complete, error, or
    /// cancellation).
    pub async fn join(self) {
        let _ = self.driver.await;
    }
}

impl Stream {
    /// Consumes the stream from a background task, invoking `next` per
    /// emission, then exactly one of `complete` or `error`.
    ///
    /// Cancellation through the returned [`Subscription`] stops the
    /// driver between emissions and aborts any producers feeding the
    /// pipeline; neither `complete` nor `error` runs after cancellation.
    ///
    /// Spawns on the ambient tokio runtime.
    pub fn observe<N, E, C>(self, mut next: N, error: E, complete: C) -> Subscription
    where
        N: FnMut(Value) + Send + 'static,
        E: FnOnce(StreamError) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let token = CancelToken::new();
        let observed = token.clone();
        let driver = tokio::spawn(async move {
            // The terminal callbacks are FnOnce; Option::take proves to
            // the compiler each runs at most once across loop turns.
            let mut error = Some(error);
            let mut complete = Some(complete);
            let mut items = self.into_value_stream();
            loop {
                let item = tokio::select! {
                    () = observed.cancelled() => {
                        debug!("subscription cancelled");
                        return;
                    }
                    item = items.next() => item,
                };
                match item {
                    Some(Ok(v)) => next(v),
                    Some(Err(StreamError::Cancelled)) | None => {
                        if let Some(callback) = complete.take() {
                            callback();
                        }
                        return;
                    }
                    Some(Err(e)) => {
                        if let Some(callback) = error.take() {
                            callback(e);
                        }
                        return;
                    }
                }
            }
        });

        Subscription { token, driver }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_observe_delivers_items_then_completes() {
        let sum = Arc::new(AtomicI64::new(0));
        let completed = Arc::new(AtomicBool::new(false));

        let sum_cb = Arc::clone(&sum);
        let completed_cb = Arc::clone(&completed);
        let subscription = Stream::from_values([1, 2, 3]).observe(
            move |v| {
                sum_cb.fetch_add(v.as_i64().unwrap_or(0), Ordering::SeqCst);
            },
            |e| panic!("unexpected error: {e}"),
            move || {
                completed_cb.store(true, Ordering::SeqCst);
            },
        );

        subscription.join().await;
        assert_eq!(sum.load(Ordering::SeqCst), 6);
        assert!(completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_observe_routes_terminal_error() {
        let saw_error = Arc::new(AtomicBool::new(false));

        let saw = Arc::clone(&saw_error);
        let subscription = Stream::from_values([1, 2])
            .try_map(|_| Err(StreamError::operator("boom")))
            .terminate_on_error()
            .observe(
                |_| panic!("no emissions expected"),
                move |_| {
                    saw.store(true, Ordering::SeqCst);
                },
                || panic!("must not complete"),
            );

        subscription.join().await;
        assert!(saw_error.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_callbacks_promptly() {
        let count = Arc::new(AtomicI64::new(0));

        let count_cb = Arc::clone(&count);
        let subscription = Stream::interval(Duration::from_millis(10)).observe(
            move |_| {
                count_cb.fetch_add(1, Ordering::SeqCst);
            },
            |e| panic!("unexpected error: {e}"),
            || {},
        );

        tokio::time::sleep(Duration::from_millis(35)).await;
        subscription.cancel();
        let after_cancel = count.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
        assert!(!subscription.is_active());
    }
}
