//! # Nagare Core
//!
//! The core engine of Nagare: a lazy, composable stream-processing
//! library whose operator pipelines compile down to fused per-item
//! functions and array kernels, while still supporting asynchronous,
//! time-based, and backpressure-aware sources.
//!
//! This crate provides:
//! - **Stream core**: lazy chaining, chain flattening, finalizers
//! - **Fusion compiler**: per-item fused evaluation plus scalar and
//!   4-lane unrolled array kernels over dense sources
//! - **Time operators**: debounce, throttle, buffers, merge,
//!   combine-latest, switch/concat-map, retry
//! - **Backpressure**: credit controllers, adaptive rate control,
//!   windowed rate limiting, composite admission
//! - **Wire contract**: frame shape and pluggable codecs for transports
//!
//! ## Design Principles
//!
//! 1. **Lazy until finalized** - chaining allocates one node, runs nothing
//! 2. **Fuse the hot path** - one walk per item, no per-operator streams
//! 3. **Single ownership** - a stream is consumed once, enforced by moves
//! 4. **Prompt cancellation** - producers abort when consumers drop
//!
//! ## Example
//!
//! ```rust,ignore
//! use nagare_core::{Stream, Value};
//!
//! let out = Stream::from_values([1, 2, 3, 4, 5])
//!     .map(|v| Value::Int(v.as_i64().unwrap_or(0) * 2))
//!     .filter(|v| v.as_i64().unwrap_or(0) > 5)
//!     .to_array()
//!     .await?;
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backpressure;
pub mod codec;
pub mod compiler;
pub mod config;
pub mod error;
pub mod kernel;
pub mod operator;
pub mod stream;
pub mod time;
pub mod value;

pub use config::{EngineConfig, JitMode};
pub use error::{ErrorPolicy, StreamError};
pub use stream::Stream;
pub use value::{F32Batch, Value};

/// Result type for nagare-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for nagare-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Pipeline evaluation errors.
    #[error("stream error: {0}")]
    Stream(#[from] error::StreamError),

    /// Transport framing errors.
    #[error("protocol error: {0}")]
    Codec(#[from] codec::CodecError),

    /// Numeric kernel boundary errors.
    #[error("kernel error: {0}")]
    Kernel(#[from] kernel::KernelError),
}
