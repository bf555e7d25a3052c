//! # Numeric Kernel Contract
//!
//! The engine treats bulk numeric transforms as external kernels: named
//! functions over dense `f32` batches. The core never assumes anything
//! about a kernel's internals - it hands over a batch view plus parameters
//! and accepts a batch back.
//!
//! Kernels are resolved **at pipeline construction**. Asking for a name the
//! registry does not know fails immediately with a recoverable
//! [`KernelError::NotFound`], before any item flows.
//!
//! ## Built-in kernels
//!
//! | Name | Parameters | Effect |
//! |------|------------|--------|
//! | `square` | - | `x → x²` |
//! | `sqrt` | - | `x → √x` |
//! | `normalize` | - | z-score over the batch |
//! | `cumsum` | - | running prefix sum |
//! | `mul_add` | `a`, `b` | `x → x·a + b` |
//!
//! Custom kernels register through [`KernelRegistry::register`].

mod builtin;

use std::sync::Arc;
use std::sync::OnceLock;

use fxhash::FxHashMap;
use parking_lot::RwLock;

use crate::value::F32Batch;

/// Errors from the kernel boundary.
///
/// All kernel faults are programming errors from the pipeline's point of
/// view: they are propagated unconditionally, never dropped or rescued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// No kernel registered under the requested name.
    #[error("unknown kernel: {0}")]
    NotFound(String),

    /// A required parameter was not supplied.
    #[error("kernel {kernel} requires parameter {param}")]
    MissingParam {
        /// Kernel name.
        kernel: String,
        /// Missing parameter name.
        param: &'static str,
    },

    /// The kernel rejected its input batch.
    #[error("kernel {kernel} rejected input: {message}")]
    InvalidInput {
        /// Kernel name.
        kernel: String,
        /// Rejection reason.
        message: String,
    },
}

/// Named scalar parameters passed to a kernel invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelParams {
    params: FxHashMap<String, f64>,
}

impl KernelParams {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, returning the set for chaining.
    #[must_use]
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.params.insert(name.to_owned(), value);
        self
    }

    /// Looks up a parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.params.get(name).copied()
    }

    /// Looks up a parameter, failing with [`KernelError::MissingParam`].
    ///
    /// # Errors
    ///
    /// Returns `MissingParam` when the parameter is absent.
    pub fn require(&self, kernel: &str, name: &'static str) -> Result<f64, KernelError> {
        self.get(name).ok_or_else(|| KernelError::MissingParam {
            kernel: kernel.to_owned(),
            param: name,
        })
    }
}

/// A batch transform: `(input, params) → output`.
pub type KernelFn = Arc<dyn Fn(&F32Batch, &KernelParams) -> Result<F32Batch, KernelError> + Send + Sync>;

/// Name-keyed kernel registry.
///
/// The process-wide registry ([`KernelRegistry::global`]) starts populated
/// with the built-in kernels; hosts with native or accelerated kernels
/// register them over the same names or new ones.
pub struct KernelRegistry {
    kernels: RwLock<FxHashMap<String, KernelFn>>,
}

impl KernelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kernels: RwLock::new(FxHashMap::default()),
        }
    }

    /// Creates a registry pre-populated with the built-in kernels.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtin::install(&registry);
        registry
    }

    /// Returns the process-wide registry.
    pub fn global() -> &'static KernelRegistry {
        static GLOBAL: OnceLock<KernelRegistry> = OnceLock::new();
        GLOBAL.get_or_init(KernelRegistry::with_builtins)
    }

    /// Registers (or replaces) a kernel under `name`.
    pub fn register(&self, name: &str, kernel: KernelFn) {
        self.kernels.write().insert(name.to_owned(), kernel);
    }

    /// Resolves a kernel by name.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NotFound`] when no kernel is registered
    /// under `name`.
    pub fn resolve(&self, name: &str) -> Result<KernelFn, KernelError> {
        self.kernels
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| KernelError::NotFound(name.to_owned()))
    }

    /// Returns the registered kernel names, unordered.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.kernels.read().keys().cloned().collect()
    }
}

impl Default for KernelRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Runs a named kernel over a batch using the process-wide registry.
///
/// # Errors
///
/// Returns [`KernelError::NotFound`] for unknown names, or whatever the
/// kernel itself rejects.
pub fn process_f32_batch(
    name: &str,
    input: &F32Batch,
    params: &KernelParams,
) -> Result<F32Batch, KernelError> {
    let kernel = KernelRegistry::global().resolve(name)?;
    kernel(input, params)
}
