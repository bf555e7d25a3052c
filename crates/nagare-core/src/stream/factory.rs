//! Stream factories.

use std::future::Future;
use std::time::Duration;

use futures::stream::StreamExt;
use tokio::sync::mpsc;

use crate::error::StreamError;
use crate::value::{F32Batch, Value};

use super::{Source, Stream};

impl Stream {
    /// A stream with no items.
    #[must_use]
    pub fn empty() -> Self {
        Self::with_source(Source::Empty)
    }

    /// A stream over in-memory values. Dense bases like this one are
    /// eligible for the array-kernel fast path.
    #[must_use]
    pub fn from_values<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::with_source(Source::Array(values.into_iter().map(Into::into).collect()))
    }

    /// Alias of [`from_values`](Self::from_values) for literal item lists.
    #[must_use]
    pub fn of<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::from_values(values)
    }

    /// A stream over a dense `f32` batch, emitted as `Float` items.
    #[must_use]
    pub fn from_f32_batch(batch: F32Batch) -> Self {
        Self::with_source(Source::Batch(batch))
    }

    /// A stream over a lazy synchronous iterator.
    #[must_use]
    pub fn from_iterator<I>(iter: I) -> Self
    where
        I: Iterator<Item = Value> + Send + 'static,
    {
        Self::with_source(Source::Iter(Box::new(iter)))
    }

    /// A stream over an asynchronous item stream.
    #[must_use]
    pub fn from_async<S>(inner: S) -> Self
    where
        S: futures::Stream<Item = Result<Value, StreamError>> + Send + 'static,
    {
        Self::with_source(Source::Async(inner.boxed()))
    }

    /// A single-item stream resolving from a future.
    #[must_use]
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, StreamError>> + Send + 'static,
    {
        Self::with_source(Source::Async(futures::stream::once(future).boxed()))
    }

    /// A stream fed by an external producer through a channel receiver.
    /// The stream completes when every sender drops.
    #[must_use]
    pub fn from_channel(rx: mpsc::Receiver<Result<Value, StreamError>>) -> Self {
        Self::with_source(Source::Channel { rx, guard: None })
    }

    /// Creates a bounded channel and the stream reading from it.
    #[must_use]
    pub fn channel(capacity: usize) -> (mpsc::Sender<Result<Value, StreamError>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::from_channel(rx))
    }

    /// Integers `start..end` with step 1.
    #[must_use]
    pub fn range(start: i64, end: i64) -> Self {
        Self::range_step(start, end, 1)
    }

    /// Integers from `start` toward `end` (exclusive) by `step`.
    ///
    /// # Panics
    ///
    /// Panics if `step` is zero.
    #[must_use]
    pub fn range_step(start: i64, end: i64, step: i64) -> Self {
        assert!(step != 0, "step must be nonzero");
        let iter = std::iter::successors(Some(start), move |&x| x.checked_add(step))
            .take_while(move |&x| if step > 0 { x < end } else { x > end })
            .map(Value::Int);
        Self::from_iterator(iter)
    }

    /// Emits `Int(0)`, `Int(1)`, … every `period`, forever.
    ///
    /// Spawns a producer task on the ambient tokio runtime; dropping the
    /// stream (or exhausting a downstream `take`) aborts it.
    #[must_use]
    pub fn interval(period: Duration) -> Self {
        crate::time::interval(period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(out: &[Value]) -> Vec<i64> {
        out.iter().map(|v| v.as_i64().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_range() {
        let out = Stream::range(0, 5).to_array().await.unwrap();
        assert_eq!(ints(&out), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_range_step_down() {
        let out = Stream::range_step(5, 0, -2).to_array().await.unwrap();
        assert_eq!(ints(&out), vec![5, 3, 1]);
    }

    #[tokio::test]
    async fn test_range_empty() {
        let out = Stream::range(3, 3).to_array().await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_of_mixed_construction() {
        let out = Stream::of(["a", "b"]).to_array().await.unwrap();
        assert_eq!(out, vec![Value::from("a"), Value::from("b")]);
    }

    #[tokio::test]
    async fn test_from_future() {
        let out = Stream::from_future(async { Ok(Value::Int(42)) })
            .to_array()
            .await
            .unwrap();
        assert_eq!(ints(&out), vec![42]);
    }

    #[tokio::test]
    async fn test_from_channel() {
        let (tx, stream) = Stream::channel(8);
        tokio::spawn(async move {
            for i in 0..3 {
                tx.send(Ok(Value::Int(i))).await.unwrap();
            }
        });
        let out = stream.to_array().await.unwrap();
        assert_eq!(ints(&out), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_lazy_iterator_source() {
        let out = Stream::from_iterator((0..4).map(Value::Int))
            .skip(1)
            .to_array()
            .await
            .unwrap();
        assert_eq!(ints(&out), vec![1, 2, 3]);
    }
}
