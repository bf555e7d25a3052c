//! # Stream Core
//!
//! The lazy stream abstraction: a base source, the operators added at
//! this level, and an error policy. Chaining is pure and O(1) - each
//! operator method returns a child stream whose base is the parent and
//! whose local operator list holds the single newly-added tag. Nothing
//! executes until a finalizer runs.
//!
//! ## Ownership
//!
//! A stream is consumed at most once: finalizers take `self` by value,
//! and chaining moves the parent into the child's source, so iterating an
//! ancestor after chaining does not compile.
//!
//! ## Example
//!
//! ```rust,ignore
//! use nagare_core::stream::Stream;
//! use nagare_core::value::Value;
//!
//! let doubled = Stream::from_values([1, 2, 3, 4, 5])
//!     .map(|v| Value::Int(v.as_i64().unwrap_or(0) * 2))
//!     .filter(|v| v.as_i64().unwrap_or(0) > 5)
//!     .to_array()
//!     .await?;
//! assert_eq!(doubled, vec![Value::Int(6), Value::Int(8), Value::Int(10)]);
//! ```

mod collect;
mod factory;
mod observe;
mod pipeline;
mod source;

pub use collect::ValueStream;
pub use observe::Subscription;
pub(crate) use pipeline::Pipeline;
pub(crate) use source::Source;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use smallvec::{smallvec, SmallVec};

use crate::error::{ErrorPolicy, StreamError};
use crate::kernel::{KernelParams, KernelRegistry};
use crate::operator::windowed::{WindowOp, WindowedAggregate};
use crate::operator::{FilterFn, MapFn, Op, OpaqueStage, ScanFn};
use crate::value::Value;

/// Operators added at one chain level. Nearly always a single operator,
/// so the inline capacity keeps chaining allocation-free.
pub(crate) type LocalOps = SmallVec<[Op; 2]>;

/// A lazy, single-consumer stream of [`Value`]s.
pub struct Stream {
    pub(crate) source: Source,
    pub(crate) ops: LocalOps,
    pub(crate) policy: ErrorPolicy,
}

impl Stream {
    pub(crate) fn with_source(source: Source) -> Self {
        Self {
            source,
            ops: SmallVec::new(),
            policy: ErrorPolicy::default(),
        }
    }

    /// Wraps `self` as the parent of a child carrying one new operator.
    fn child(self, op: Op) -> Self {
        let policy = self.policy.clone();
        Self {
            source: Source::Parent(Box::new(self)),
            ops: smallvec![op],
            policy,
        }
    }

    // ------------------------------------------------------------------
    // Recognized operators
    // ------------------------------------------------------------------

    /// Transforms each item.
    #[must_use]
    pub fn map<F>(self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.child(Op::Map(MapFn::Sync(Arc::new(move |v| Ok(f(v))))))
    }

    /// Transforms each item with a fallible function; faults go through
    /// the stream's error policy.
    #[must_use]
    pub fn try_map<F>(self, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, StreamError> + Send + Sync + 'static,
    {
        self.child(Op::Map(MapFn::Sync(Arc::new(f))))
    }

    /// Transforms each item asynchronously.
    ///
    /// The presence of an async stage routes the whole pipeline through
    /// the async execution path.
    #[must_use]
    pub fn map_async<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, StreamError>> + Send + 'static,
    {
        self.child(Op::Map(MapFn::Async(Arc::new(move |v| {
            Box::pin(f(v))
        }))))
    }

    /// Keeps items matching the predicate.
    #[must_use]
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.child(Op::Filter(FilterFn::Sync(Arc::new(move |v| {
            Ok(predicate(v))
        }))))
    }

    /// Keeps items matching a fallible predicate.
    #[must_use]
    pub fn try_filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&Value) -> Result<bool, StreamError> + Send + Sync + 'static,
    {
        self.child(Op::Filter(FilterFn::Sync(Arc::new(predicate))))
    }

    /// Keeps items matching an async predicate.
    #[must_use]
    pub fn filter_async<F, Fut>(self, predicate: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, StreamError>> + Send + 'static,
    {
        self.child(Op::Filter(FilterFn::Async(Arc::new(move |v| {
            Box::pin(predicate(v))
        }))))
    }

    /// Folds items into a running accumulator, emitting each intermediate
    /// value. The seed itself is not emitted.
    #[must_use]
    pub fn scan<F>(self, f: F, seed: impl Into<Value>) -> Self
    where
        F: Fn(Value, Value) -> Value + Send + Sync + 'static,
    {
        self.child(Op::Scan {
            f: ScanFn::Sync(Arc::new(move |acc, v| Ok(f(acc, v)))),
            seed: seed.into(),
        })
    }

    /// Folds items with a fallible function.
    #[must_use]
    pub fn try_scan<F>(self, f: F, seed: impl Into<Value>) -> Self
    where
        F: Fn(Value, Value) -> Result<Value, StreamError> + Send + Sync + 'static,
    {
        self.child(Op::Scan {
            f: ScanFn::Sync(Arc::new(f)),
            seed: seed.into(),
        })
    }

    /// Passes the first `n` items, then completes the stream without
    /// polling the source further.
    #[must_use]
    pub fn take(self, n: u32) -> Self {
        self.child(Op::Take(n))
    }

    /// Drops the first `n` items.
    #[must_use]
    pub fn skip(self, n: u32) -> Self {
        self.child(Op::Skip(n))
    }

    /// Runs a named numeric kernel over each `f32`-batch item.
    ///
    /// The kernel is resolved from the process-wide registry now, at
    /// construction - an unknown name fails here, recoverably, before any
    /// item flows.
    ///
    /// # Errors
    ///
    /// Returns a kernel fault when `name` is not registered.
    pub fn map_kernel(self, name: &str, params: KernelParams) -> Result<Self, StreamError> {
        let func = KernelRegistry::global().resolve(name)?;
        Ok(self.child(Op::Kernel {
            name: name.to_owned(),
            params,
            func,
        }))
    }

    // ------------------------------------------------------------------
    // Opaque (stateful per-item) operators
    // ------------------------------------------------------------------

    /// Adds an unrecognized stateful stage.
    ///
    /// `factory` builds a fresh stage per pipeline instantiation; the
    /// stage returns `Ok(None)` to drop an item. This is the escape hatch
    /// the built-in stateful operators (`pairwise`, `windowed_aggregate`,
    /// …) are made of.
    #[must_use]
    pub fn opaque<F>(self, label: &'static str, factory: F) -> Self
    where
        F: Fn() -> OpaqueStage + Send + Sync + 'static,
    {
        self.child(Op::Opaque {
            label,
            factory: Arc::new(factory),
        })
    }

    /// Emits `(previous, current)` pairs; the first item produces nothing.
    #[must_use]
    pub fn pairwise(self) -> Self {
        self.opaque("pairwise", || {
            let mut prev: Option<Value> = None;
            Box::new(move |v| {
                let out = prev.as_ref().map(|p| Value::pair(p.clone(), v.clone()));
                prev = Some(v);
                Ok(out)
            })
        })
    }

    /// Drops items equal to the immediately previous emission. The first
    /// item is always emitted.
    #[must_use]
    pub fn distinct_until_changed(self) -> Self {
        self.opaque("distinct_until_changed", || {
            let mut prev: Option<Value> = None;
            Box::new(move |v| {
                if prev.as_ref() == Some(&v) {
                    return Ok(None);
                }
                prev = Some(v.clone());
                Ok(Some(v))
            })
        })
    }

    /// Sliding aggregate over the most recent `window` numeric items.
    /// Emits once the window fills, then on every subsequent item.
    /// Non-numeric items raise a type fault, which always propagates.
    ///
    /// # Panics
    ///
    /// Panics if `window` is zero.
    #[must_use]
    pub fn windowed_aggregate(self, window: usize, op: WindowOp) -> Self {
        assert!(window > 0, "window size must be positive");
        self.opaque("windowed_aggregate", move || {
            let mut aggregate = WindowedAggregate::new(window, op);
            Box::new(move |v| {
                let x = v.expect_f64()?;
                Ok(aggregate.push(x).map(Value::Float))
            })
        })
    }

    /// Prepends values ahead of the upstream items.
    #[must_use]
    pub fn start_with<I, T>(self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let policy = self.policy.clone();
        Self {
            source: Source::Prepend {
                values: values.into_iter().map(Into::into).collect(),
                parent: Box::new(self),
            },
            ops: SmallVec::new(),
            policy,
        }
    }

    // ------------------------------------------------------------------
    // Error policy
    // ------------------------------------------------------------------

    /// Installs a recovery handler: a faulting item is replaced by the
    /// handler's value (skipping the remaining operators), or dropped if
    /// the handler returns `None`.
    ///
    /// The outer-most policy governs the whole flattened pipeline.
    #[must_use]
    pub fn rescue<F>(mut self, handler: F) -> Self
    where
        F: Fn(&StreamError) -> Option<Value> + Send + Sync + 'static,
    {
        self.policy = ErrorPolicy::rescue(handler);
        self
    }

    /// Makes any operator fault surface to the consumer and close the
    /// stream.
    #[must_use]
    pub fn terminate_on_error(mut self) -> Self {
        self.policy = ErrorPolicy::Terminate;
        self
    }

    /// Replaces the error policy wholesale.
    #[must_use]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    // ------------------------------------------------------------------
    // Time-ordered and composite operators (see `crate::time`)
    // ------------------------------------------------------------------

    /// Emits the latest item once `period` elapses with no newer arrival.
    /// Pending value is flushed on upstream completion.
    ///
    /// Spawns a producer task on the ambient tokio runtime.
    #[must_use]
    pub fn debounce(self, period: Duration) -> Self {
        crate::time::debounce(self, period)
    }

    /// Emits the first item immediately, then drops items arriving within
    /// `period` of the last emission.
    ///
    /// Spawns a producer task on the ambient tokio runtime.
    #[must_use]
    pub fn throttle(self, period: Duration) -> Self {
        crate::time::throttle(self, period)
    }

    /// Collects items into fixed-size tuples; the remainder flushes on
    /// completion.
    ///
    /// Spawns a producer task on the ambient tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    #[must_use]
    pub fn buffer(self, size: usize) -> Self {
        crate::time::buffer(self, size)
    }

    /// Collects items into tuples flushed on a timer: the window opens on
    /// first arrival, emits on each tick if non-empty, and the remainder
    /// flushes on completion.
    ///
    /// Spawns a producer task on the ambient tokio runtime.
    #[must_use]
    pub fn buffer_time(self, period: Duration) -> Self {
        crate::time::buffer_time(self, period)
    }

    /// Interleaves this stream with another in arrival order.
    ///
    /// Spawns a producer task on the ambient tokio runtime.
    #[must_use]
    pub fn merge(self, other: Stream) -> Self {
        crate::time::merge(vec![self, other])
    }

    /// Pairs the n-th item of this stream with the n-th of the other;
    /// completes when either completes.
    ///
    /// Spawns a producer task on the ambient tokio runtime.
    #[must_use]
    pub fn zip(self, other: Stream) -> Self {
        crate::time::zip(vec![self, other])
    }

    /// Emits the latest pair whenever either stream yields, once both
    /// have produced at least one item.
    ///
    /// Spawns a producer task on the ambient tokio runtime.
    #[must_use]
    pub fn combine_latest(self, other: Stream) -> Self {
        crate::time::combine_latest(vec![self, other])
    }

    /// Maps each item to an inner stream and drains it fully before
    /// advancing to the next outer item.
    ///
    /// Spawns a producer task on the ambient tokio runtime.
    #[must_use]
    pub fn concat_map<F>(self, f: F) -> Self
    where
        F: Fn(Value) -> Stream + Send + Sync + 'static,
    {
        crate::time::concat_map(self, Arc::new(f))
    }

    /// Maps each item to an inner stream, cancelling the previous inner
    /// on each new outer item.
    ///
    /// Spawns a producer task on the ambient tokio runtime.
    #[must_use]
    pub fn switch_map<F>(self, f: F) -> Self
    where
        F: Fn(Value) -> Stream + Send + Sync + 'static,
    {
        crate::time::switch_map(self, Arc::new(f))
    }

    /// Re-attempts the upstream pull after an error, up to `max_attempts`
    /// times with linear backoff `delay · attempt`. Already-emitted items
    /// are never rewound.
    ///
    /// Spawns a producer task on the ambient tokio runtime.
    #[must_use]
    pub fn retry(self, max_attempts: u32, delay: Duration) -> Self {
        crate::time::retry(self, max_attempts, delay)
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("source", &self.source)
            .field("ops", &self.ops)
            .field("policy", &self.policy)
            .finish()
    }
}
