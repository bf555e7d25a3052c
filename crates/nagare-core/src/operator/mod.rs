//! # Operator Tag Model
//!
//! Operators are carried as structured data, not opaque closures: a tagged
//! [`Op`] enum whose variants the fusion compiler recognizes and
//! specializes on. The payload of each variant is the operator's function
//! (sync or async) plus whatever static configuration it needs.
//!
//! ## Statefulness
//!
//! `Scan`, `Take`, and `Skip` are stateful: their accumulator / cursors
//! live in the compiled pipeline's state, instantiated fresh per pipeline
//! so re-running a re-iterable source starts from scratch. `Opaque`
//! operators carry a *factory* that builds a fresh stateful stage per
//! instantiation for the same reason - `pairwise`, `distinct_until_changed`,
//! and the windowed aggregate are all opaque stages with private state.
//!
//! ## Recognition
//!
//! The compiler treats `Map`/`Filter`/`Scan`/`Take`/`Skip`/`Kernel` as
//! structured (fuseable with full knowledge of their semantics) and
//! `Opaque` as a black box evaluated in place.

pub mod windowed;

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::StreamError;
use crate::kernel::{KernelFn, KernelParams};
use crate::value::Value;

/// Synchronous mapping function.
pub type SyncMapFn = Arc<dyn Fn(Value) -> Result<Value, StreamError> + Send + Sync>;

/// Asynchronous mapping function.
pub type AsyncMapFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, StreamError>> + Send + Sync>;

/// A map stage: sync or async.
#[derive(Clone)]
pub enum MapFn {
    /// Evaluated inline on the sync paths.
    Sync(SyncMapFn),
    /// Forces the pipeline onto the async path.
    Async(AsyncMapFn),
}

/// Synchronous predicate.
pub type SyncPredicateFn = Arc<dyn Fn(&Value) -> Result<bool, StreamError> + Send + Sync>;

/// Asynchronous predicate.
pub type AsyncPredicateFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<bool, StreamError>> + Send + Sync>;

/// A filter stage: sync or async.
#[derive(Clone)]
pub enum FilterFn {
    /// Evaluated inline on the sync paths.
    Sync(SyncPredicateFn),
    /// Forces the pipeline onto the async path.
    Async(AsyncPredicateFn),
}

/// Synchronous fold function: `(accumulator, item) → accumulator`.
pub type SyncScanFn = Arc<dyn Fn(Value, Value) -> Result<Value, StreamError> + Send + Sync>;

/// Asynchronous fold function.
pub type AsyncScanFn =
    Arc<dyn Fn(Value, Value) -> BoxFuture<'static, Result<Value, StreamError>> + Send + Sync>;

/// A scan stage: sync or async.
#[derive(Clone)]
pub enum ScanFn {
    /// Evaluated inline on the sync paths.
    Sync(SyncScanFn),
    /// Forces the pipeline onto the async path.
    Async(AsyncScanFn),
}

/// A stateful opaque stage. Returns `Ok(None)` to drop the item.
pub type OpaqueStage = Box<dyn FnMut(Value) -> Result<Option<Value>, StreamError> + Send>;

/// Builds a fresh [`OpaqueStage`] per pipeline instantiation.
pub type OpaqueFactory = Arc<dyn Fn() -> OpaqueStage + Send + Sync>;

/// A tagged pipeline operator.
#[derive(Clone)]
pub enum Op {
    /// `x → f(x)`.
    Map(MapFn),
    /// Drops items failing the predicate.
    Filter(FilterFn),
    /// Emits each intermediate accumulator; the seed itself is not emitted.
    Scan {
        /// Fold function.
        f: ScanFn,
        /// Initial accumulator, cloned fresh per pipeline instantiation.
        seed: Value,
    },
    /// Passes the first `n` items, then terminates the stream.
    Take(u32),
    /// Drops the first `n` items.
    Skip(u32),
    /// Named numeric kernel over `f32` batch items.
    ///
    /// Resolved at construction; `func` is the bound kernel.
    Kernel {
        /// Registered kernel name (diagnostics only once bound).
        name: String,
        /// Invocation parameters.
        params: KernelParams,
        /// The resolved kernel function.
        func: KernelFn,
    },
    /// Unrecognized stage evaluated as a black box.
    Opaque {
        /// Short label for diagnostics (`"pairwise"`, `"windowed"`, …).
        label: &'static str,
        /// Builds the fresh stateful stage per pipeline instantiation.
        factory: OpaqueFactory,
    },
}

impl Op {
    /// Returns true if the operator carries per-pipeline state.
    #[must_use]
    pub fn is_stateful(&self) -> bool {
        matches!(
            self,
            Op::Scan { .. } | Op::Take(_) | Op::Skip(_) | Op::Opaque { .. }
        )
    }

    /// Returns true if the operator's function is asynchronous.
    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(
            self,
            Op::Map(MapFn::Async(_)) | Op::Filter(FilterFn::Async(_)) | Op::Scan {
                f: ScanFn::Async(_),
                ..
            }
        )
    }

    /// Returns the operator kind for diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Op::Map(_) => "map",
            Op::Filter(_) => "filter",
            Op::Scan { .. } => "scan",
            Op::Take(_) => "take",
            Op::Skip(_) => "skip",
            Op::Kernel { .. } => "kernel",
            Op::Opaque { label, .. } => label,
        }
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Take(n) => write!(f, "take({n})"),
            Op::Skip(n) => write!(f, "skip({n})"),
            Op::Kernel { name, .. } => write!(f, "kernel({name})"),
            other => write!(f, "{}", other.kind_name()),
        }
    }
}
