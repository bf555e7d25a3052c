//! Stream-level error taxonomy.
//!
//! Classifies faults by *kind*, not by operator: the execution layer uses
//! the kind to decide whether a fault is subject to the pipeline's error
//! policy (operator faults are) or propagates unconditionally (type and
//! kernel faults do - they indicate a programming error, not bad data).

use std::sync::Arc;

use crate::kernel::KernelError;
use crate::value::{TypeMismatch, Value};

/// A fault raised while evaluating a pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    /// A user callback failed.
    #[error("operator fault: {0}")]
    Operator(Arc<str>),

    /// A value had the wrong shape for a typed operator.
    #[error("type fault: {0}")]
    Type(#[from] TypeMismatch),

    /// The underlying source failed or closed abnormally.
    #[error("source fault: {0}")]
    Source(Arc<str>),

    /// The numeric kernel boundary failed.
    #[error("kernel fault: {0}")]
    Kernel(#[from] KernelError),

    /// Cooperative cancellation. Surfaced as completion, not as an error
    /// callback.
    #[error("stream cancelled")]
    Cancelled,
}

impl StreamError {
    /// Builds an operator fault from a user callback's message.
    #[must_use]
    pub fn operator(message: impl AsRef<str>) -> Self {
        StreamError::Operator(Arc::from(message.as_ref()))
    }

    /// Builds a source fault.
    #[must_use]
    pub fn source(message: impl AsRef<str>) -> Self {
        StreamError::Source(Arc::from(message.as_ref()))
    }

    /// Returns true for fault kinds that bypass the error policy.
    ///
    /// Type and kernel faults always propagate; dropping or rescuing them
    /// would hide a programming error.
    #[must_use]
    pub fn bypasses_policy(&self) -> bool {
        matches!(self, StreamError::Type(_) | StreamError::Kernel(_))
    }
}

/// Recovery handler: maps a fault to a replacement value, or `None` to
/// drop the item.
pub type RescueFn = Arc<dyn Fn(&StreamError) -> Option<Value> + Send + Sync>;

/// Per-item fault handling for a pipeline.
///
/// The outer-most stream's policy governs the whole flattened pipeline.
/// Type and kernel faults bypass the policy unconditionally.
#[derive(Clone, Default)]
pub enum ErrorPolicy {
    /// Emit nothing for the faulting item; the stream continues. Source
    /// faults surface to the consumer.
    Propagate,
    /// Emit nothing for the faulting item; the stream continues.
    #[default]
    Drop,
    /// Hand the fault to a recovery handler. A returned value is emitted
    /// in place of the item and the remaining operators are skipped.
    Rescue(RescueFn),
    /// Surface the fault to the consumer and close the stream.
    Terminate,
}

impl ErrorPolicy {
    /// Builds a rescue policy from a handler closure.
    #[must_use]
    pub fn rescue<F>(handler: F) -> Self
    where
        F: Fn(&StreamError) -> Option<Value> + Send + Sync + 'static,
    {
        ErrorPolicy::Rescue(Arc::new(handler))
    }

    /// Returns the policy name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ErrorPolicy::Propagate => "propagate",
            ErrorPolicy::Drop => "drop",
            ErrorPolicy::Rescue(_) => "rescue",
            ErrorPolicy::Terminate => "terminate",
        }
    }
}

impl std::fmt::Debug for ErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_fault_display() {
        let err = StreamError::operator("boom");
        assert_eq!(err.to_string(), "operator fault: boom");
    }

    #[test]
    fn test_type_fault_bypasses_policy() {
        let err: StreamError = Value::from("x").expect_f64().unwrap_err().into();
        assert!(err.bypasses_policy());
        assert!(!StreamError::operator("boom").bypasses_policy());
    }
}
