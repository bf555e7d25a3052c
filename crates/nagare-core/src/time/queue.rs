//! Producer/consumer plumbing for the time operators.
//!
//! Every time-ordered operator is an independent stream whose base is a
//! bounded queue fed by a background producer task. The consumer awaits
//! the queue; the producer awaits the upstream, timers, or both. The
//! queue's bounded capacity is what backpressures a fast producer against
//! a slow consumer.
//!
//! ## Cancellation
//!
//! Each producer gets a [`CancelToken`]. Dropping the consuming stream
//! drops the [`ProducerGuard`], which cancels the token and aborts the
//! task - timers and queue slots are released on every exit path.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::error::StreamError;
use crate::stream::{Source, Stream};
use crate::value::Value;

/// Queue capacity between a time operator's producer and its consumer.
pub(crate) const QUEUE_CAPACITY: usize = 64;

/// Sending half of a time operator's queue.
pub(crate) type OpSender = mpsc::Sender<Result<Value, StreamError>>;

struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation token.
///
/// Cloned freely; cancelling any clone cancels them all. Producer tasks
/// observe cancellation between item yields.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<TokenState>,
}

impl CancelToken {
    /// Creates an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Requests cancellation and wakes all waiters.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        loop {
            // Register before re-checking so a cancel between the check
            // and the await cannot be missed.
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
            if self.is_cancelled() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Abort-on-drop handle for a producer task.
pub(crate) struct ProducerGuard {
    token: CancelToken,
    handle: JoinHandle<()>,
}

impl ProducerGuard {
    pub(crate) fn new(token: CancelToken, handle: JoinHandle<()>) -> Self {
        Self { token, handle }
    }
}

impl Drop for ProducerGuard {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

impl fmt::Debug for ProducerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerGuard")
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Spawns a producer task on the ambient tokio runtime and returns the
/// stream consuming its queue.
///
/// The producer receives the sending half and a cancellation token; it
/// must observe the token between yields. Dropping the returned stream
/// cancels and aborts the producer.
pub(crate) fn spawn_op<F, Fut>(label: &'static str, build: F) -> Stream
where
    F: FnOnce(OpSender, CancelToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let token = CancelToken::new();
    let task = build(tx, token.clone());
    let handle = tokio::spawn(async move {
        task.await;
        tracing::trace!(operator = label, "producer task finished");
    });

    Stream::with_source(Source::Channel {
        rx,
        guard: Some(ProducerGuard::new(token, handle)),
    })
}
