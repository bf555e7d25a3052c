//! Stream base sources.
//!
//! The non-stream bases a pipeline can bottom out at, plus the conversion
//! of each into a raw async item stream for the generic execution path.
//! Dense bases (`Array`, `Batch`) are additionally recognized by the
//! collect dispatch for the array-kernel fast path.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::StreamError;
use crate::time::queue::ProducerGuard;
use crate::value::{F32Batch, Value};

use super::Stream;

/// An item or fault produced by a source.
pub(crate) type SourceItem = Result<Value, StreamError>;

/// The base of a stream.
pub(crate) enum Source {
    /// No items.
    Empty,
    /// In-memory dense values; enables the array-kernel fast path.
    Array(Vec<Value>),
    /// Dense numeric samples, streamed as `Float` items.
    Batch(F32Batch),
    /// Lazy synchronous iterator.
    Iter(Box<dyn Iterator<Item = Value> + Send>),
    /// Asynchronous item stream.
    Async(BoxStream<'static, SourceItem>),
    /// Queue fed by a background producer task. Dropping the guard aborts
    /// the producer.
    Channel {
        /// Receiving half of the producer's queue.
        rx: mpsc::Receiver<SourceItem>,
        /// Abort-on-drop handle for the producer task; `None` for
        /// externally-fed channels.
        guard: Option<ProducerGuard>,
    },
    /// Link to the parent stream in an operator chain.
    Parent(Box<Stream>),
    /// Values emitted ahead of the parent's items.
    Prepend {
        /// The prepended values.
        values: Vec<Value>,
        /// The upstream whose items follow.
        parent: Box<Stream>,
    },
}

impl Source {
    /// Converts the base into a raw async item stream.
    ///
    /// `Parent` links are normally removed by flattening before this
    /// runs; a remaining one simply executes the parent pipeline.
    pub(crate) fn into_item_stream(self) -> BoxStream<'static, SourceItem> {
        match self {
            Source::Empty => stream::empty().boxed(),
            Source::Array(values) => stream::iter(values.into_iter().map(Ok)).boxed(),
            Source::Batch(batch) => stream::iter(
                batch
                    .to_vec()
                    .into_iter()
                    .map(|x| Ok(Value::Float(f64::from(x)))),
            )
            .boxed(),
            Source::Iter(iter) => stream::iter(iter).map(Ok).boxed(),
            Source::Async(inner) => inner,
            Source::Channel { rx, guard } => GuardedReceiver {
                inner: ReceiverStream::new(rx),
                _guard: guard,
            }
            .boxed(),
            Source::Parent(parent) => parent.into_value_stream(),
            Source::Prepend { values, parent } => stream::iter(values.into_iter().map(Ok))
                .chain(parent.into_value_stream())
                .boxed(),
        }
    }
}

/// A channel receiver stream that keeps its producer guard alive; when
/// the consumer drops this, the guard aborts the producer task.
struct GuardedReceiver {
    inner: ReceiverStream<SourceItem>,
    _guard: Option<ProducerGuard>,
}

impl tokio_stream::Stream for GuardedReceiver {
    type Item = SourceItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Empty => f.write_str("empty"),
            Source::Array(values) => write!(f, "array({} items)", values.len()),
            Source::Batch(batch) => write!(f, "batch({} samples)", batch.len()),
            Source::Iter(_) => f.write_str("iter"),
            Source::Async(_) => f.write_str("async"),
            Source::Channel { guard, .. } => {
                write!(f, "channel(guarded: {})", guard.is_some())
            }
            Source::Parent(parent) => write!(f, "parent({parent:?})"),
            Source::Prepend { values, parent } => {
                write!(f, "prepend({} values, {parent:?})", values.len())
            }
        }
    }
}
