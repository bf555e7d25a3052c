//! # Dynamic Item Model
//!
//! Every item flowing through a pipeline is a [`Value`] - a cheap-to-clone
//! sum type covering the payloads the engine moves around: scalars, strings,
//! raw bytes, dense `f32` batches, and small tuples.
//!
//! ## Design
//!
//! - Heap-backed variants (`Str`, `Bytes`, `Batch`, `List`) are reference
//!   counted, so cloning a `Value` is O(1) regardless of payload size.
//! - `List` doubles as the tuple encoding used by `pairwise`, `zip`, and
//!   `combine_latest`.
//! - Numeric coercion is one-directional: `Int` widens to `Float` where an
//!   operator needs `f64`. Nothing narrows implicitly.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// A dense, immutable batch of `f32` samples.
///
/// Batches are the unit the numeric kernel contract operates on. The
/// backing buffer is shared (`Arc<[f32]>`), so clones and the kernel
/// boundary are zero-copy.
#[derive(Debug, Clone, PartialEq)]
pub struct F32Batch {
    data: Arc<[f32]>,
}

impl F32Batch {
    /// Creates a batch from a vector of samples.
    #[must_use]
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self { data: data.into() }
    }

    /// Returns the samples as a contiguous slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Returns the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the batch holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copies the samples into a fresh vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.to_vec()
    }
}

impl From<Vec<f32>> for F32Batch {
    fn from(data: Vec<f32>) -> Self {
        Self::from_vec(data)
    }
}

impl FromIterator<f32> for F32Batch {
    fn from_iter<I: IntoIterator<Item = f32>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

/// A dynamically-typed stream item.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absence of a value (distinct from an item being dropped).
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string (shared).
    Str(Arc<str>),
    /// Raw bytes (shared).
    Bytes(Bytes),
    /// Dense `f32` batch (shared).
    Batch(F32Batch),
    /// Tuple / small list (shared).
    List(Arc<[Value]>),
}

/// A value had the wrong shape for a typed operator.
///
/// Converted into the stream-level type fault by the execution layer;
/// type faults are propagated unconditionally, never dropped or rescued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, got {actual}")]
pub struct TypeMismatch {
    /// The shape the operator required.
    pub expected: &'static str,
    /// The shape it was handed.
    pub actual: &'static str,
}

impl Value {
    /// Builds a two-element tuple, as emitted by `pairwise` and `zip`.
    #[must_use]
    pub fn pair(first: Value, second: Value) -> Self {
        Value::List(Arc::from(vec![first, second]))
    }

    /// Builds a tuple from any number of elements.
    #[must_use]
    pub fn tuple(items: Vec<Value>) -> Self {
        Value::List(Arc::from(items))
    }

    /// Returns the variant name, used in type-fault diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Batch(_) => "f32 batch",
            Value::List(_) => "list",
        }
    }

    /// Returns the integer payload, if this is an `Int`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as `f64`, widening `Int` losslessly for the
    /// common magnitudes streams carry.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the boolean payload, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the batch payload, if this is a `Batch`.
    #[must_use]
    pub fn as_batch(&self) -> Option<&F32Batch> {
        match self {
            Value::Batch(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the tuple elements, if this is a `List`.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Requires a numeric value, widening `Int` to `f64`.
    ///
    /// # Errors
    ///
    /// Returns [`TypeMismatch`] for any non-numeric variant.
    pub fn expect_f64(&self) -> Result<f64, TypeMismatch> {
        self.as_f64().ok_or(TypeMismatch {
            expected: "number",
            actual: self.type_name(),
        })
    }

    /// Requires a dense `f32` batch.
    ///
    /// # Errors
    ///
    /// Returns [`TypeMismatch`] for any other variant.
    pub fn expect_batch(&self) -> Result<&F32Batch, TypeMismatch> {
        self.as_batch().ok_or(TypeMismatch {
            expected: "f32 batch",
            actual: self.type_name(),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Batch(b) => write!(f, "<f32 batch, {} samples>", b.len()),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Float(f64::from(x))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s.as_str()))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<F32Batch> for Value {
    fn from(b: F32Batch) -> Self {
        Value::Batch(b)
    }
}

impl From<Vec<f32>> for Value {
    fn from(data: Vec<f32>) -> Self {
        Value::Batch(F32Batch::from_vec(data))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::tuple(items)
    }
}
