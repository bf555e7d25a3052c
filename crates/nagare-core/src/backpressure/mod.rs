//! # Credit-Based Backpressure
//!
//! Flow control for streams crossing task or transport boundaries.
//!
//! ```text
//! ┌──────────┐                       ┌──────────┐
//! │ Producer │ <── Credits (N) ───── │ Consumer │
//! │          │                       │          │
//! │          │ ──── Items ─────────> │          │
//! │          │                       │          │
//! │          │ <── Credits (N) ───── │          │
//! └──────────┘                       └──────────┘
//! ```
//!
//! 1. The consumer grants initial credits (queue slots) to the producer.
//! 2. The producer consumes one credit per emitted item; at zero it waits
//!    on the credit notifier.
//! 3. The consumer grants credits back as it drains.
//!
//! Layered on top of the raw credit accounting:
//!
//! - [`MultiStreamCreditManager`] - per-stream controllers behind one
//!   keyed map, for hosts multiplexing many subscriptions.
//! - [`AdaptiveBackpressure`] - a target-latency rate controller that
//!   nudges the admissible rate after every latency observation.
//! - [`WindowedRateLimiter`] - sliding-window event budget.
//! - [`DynamicBackpressure`] - composite admission policy combining
//!   queue depth, latency, and the adaptive rate.
//!
//! Credit controllers are the only primitives in the engine shared across
//! tasks; everything else lives in a single pipeline's ownership domain.

mod adaptive;
mod credit;
mod dynamic;
mod multi;
mod rate_limiter;

pub use adaptive::{AdaptiveBackpressure, DEFAULT_GAIN};
pub use credit::{CreditController, MAX_CREDITS};
pub use dynamic::{AdmitDecision, DynamicBackpressure, LoadMetrics, RejectReason};
pub use multi::MultiStreamCreditManager;
pub use rate_limiter::WindowedRateLimiter;
