//! # Pipeline Fusion Compiler
//!
//! Compiles a flattened operator list into executable variants that
//! evaluate a whole chain per item without intermediate allocations:
//!
//! - **Guarded per-item** ([`FusedPipeline::apply`]): walks the operator
//!   list once per item, short-circuiting on drops, resolving faults
//!   through the pipeline's error policy.
//! - **Policy-free per-item step**: the same walk without the policy
//!   guard, used inside the array kernels; a fault aborts the batch at its
//!   index and the executor resolves that one item through the guarded
//!   path before resuming.
//! - **Array kernels** ([`FusedPipeline::run_kernel`]): a tight loop over
//!   a dense source slice, scalar or 4-lane unrolled. The unrolled form is
//!   only legal when no `take` is present (its global early break is
//!   incompatible with in-flight lanes) and only worthwhile for very large
//!   inputs.
//! - **Async fused** ([`FusedPipeline::apply_async`]): sequentially awaits
//!   each stage; shares the same per-pipeline state, so a sync pipeline
//!   that detects an async stage hands off mid-stream with scan
//!   accumulators and take/skip cursors intact.
//!
//! The [`Interpreter`] is the reference evaluator: a deliberately simple
//! per-item walk used when fusion is disabled, and as the oracle the
//! fused paths are tested against.
//!
//! ## Determinism
//!
//! Given identical operators and inputs, every variant produces the same
//! output sequence. Kernel selection only changes how fast items move,
//! never which items come out.

mod fused;
mod interp;
mod kernel;

pub use fused::{eval_stateless, FusedPipeline, Step};
pub use interp::Interpreter;
pub use kernel::KernelExit;
