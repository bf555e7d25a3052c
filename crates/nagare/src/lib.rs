//! # Nagare
//!
//! A lazy, composable stream-processing engine. RxJS-style operator
//! pipelines that run at hand-written-loop speed on bulk in-memory data,
//! with first-class async sources, time-based operators, and credit-based
//! backpressure for transports.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use nagare::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let doubled_evens = Stream::from_values([1, 2, 3, 4, 5])
//!         .map(|v| Value::Int(v.as_i64().unwrap_or(0) * 2))
//!         .filter(|v| v.as_i64().unwrap_or(0) > 5)
//!         .to_array()
//!         .await?;
//!     assert_eq!(doubled_evens, vec![Value::Int(6), Value::Int(8), Value::Int(10)]);
//!
//!     let sums = Stream::range(1, 6)
//!         .scan(|acc, v| Value::Int(acc.as_i64().unwrap_or(0) + v.as_i64().unwrap_or(0)), 0)
//!         .last()
//!         .await?;
//!     assert_eq!(sums, Some(Value::Int(15)));
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub use nagare_core::*;

// Re-export the operator-adjacent types callers reach for directly.
pub use nagare_core::backpressure::{
    AdaptiveBackpressure, CreditController, DynamicBackpressure, MultiStreamCreditManager,
    WindowedRateLimiter,
};
pub use nagare_core::operator::windowed::WindowOp;
pub use nagare_core::time::CancelToken;

/// Commonly used types and traits.
///
/// ```rust,ignore
/// use nagare::prelude::*;
/// ```
pub mod prelude {
    // Streams
    pub use nagare_core::stream::{Stream, Subscription, ValueStream};
    pub use nagare_core::value::{F32Batch, Value};
    pub use nagare_core::{ErrorPolicy, StreamError};

    // Operators
    pub use nagare_core::operator::windowed::WindowOp;
    pub use nagare_core::time::{combine, combine_latest, interval, merge, zip, CancelToken};

    // Configuration
    pub use nagare_core::{EngineConfig, JitMode};

    // Backpressure
    pub use nagare_core::backpressure::{
        AdaptiveBackpressure, AdmitDecision, CreditController, DynamicBackpressure, LoadMetrics,
        MultiStreamCreditManager, WindowedRateLimiter,
    };

    // Wire contract
    pub use nagare_core::codec::{
        BinaryFrameCodec, ControlMessage, Frame, FrameCodec, FrameSequencer, JsonFrameCodec,
        Payload,
    };

    // Kernels
    pub use nagare_core::kernel::{process_f32_batch, KernelParams, KernelRegistry};
}
