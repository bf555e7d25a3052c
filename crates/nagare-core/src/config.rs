//! # Engine Configuration
//!
//! Process-wide toggles controlling how pipelines compile and execute.
//! The configuration is read once per pipeline at construction time
//! ([`EngineConfig::snapshot`]); changing it affects pipelines built
//! afterwards, never ones already running.
//!
//! ## Toggles
//!
//! | Option | Effect |
//! |--------|--------|
//! | `jit` | `Off` disables the array kernels (Variant C); per-item fusion stays on. |
//! | `fusion_enabled` | `false` disables fused evaluation entirely; the reference interpreter runs instead. |
//! | `async_concurrency` | Max in-flight items for the async collect path. |
//! | `unroll_threshold` | Minimum array length before the 4-lane unrolled kernel is chosen. |
//!
//! ## Environment bootstrap
//!
//! The first snapshot seeds the global from the environment:
//! `DISABLE_JIT=true`, `DISABLE_FUSION=true`, `NAGARE_ASYNC_CONCURRENCY`,
//! `NAGARE_UNROLL_THRESHOLD`.

use std::sync::OnceLock;

use parking_lot::RwLock;

/// Default bound on in-flight items for the async collect path.
pub const DEFAULT_ASYNC_CONCURRENCY: usize = 256;

/// Default minimum array length for the 4-lane unrolled kernel.
///
/// Below this, kernel selection overhead outweighs the unrolling win.
pub const DEFAULT_UNROLL_THRESHOLD: usize = 200_000;

/// Kernel specialization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitMode {
    /// Array kernels enabled (scalar and unrolled).
    #[default]
    Fast,
    /// Array kernels disabled; per-item fused evaluation only.
    Off,
}

/// Process-wide engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Kernel specialization mode.
    pub jit: JitMode,
    /// Whether fused evaluation is enabled at all.
    pub fusion_enabled: bool,
    /// Max in-flight items for the async collect path.
    pub async_concurrency: usize,
    /// Minimum array length for the unrolled kernel.
    pub unroll_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            jit: JitMode::Fast,
            fusion_enabled: true,
            async_concurrency: DEFAULT_ASYNC_CONCURRENCY,
            unroll_threshold: DEFAULT_UNROLL_THRESHOLD,
        }
    }
}

fn global() -> &'static RwLock<EngineConfig> {
    static CONFIG: OnceLock<RwLock<EngineConfig>> = OnceLock::new();
    CONFIG.get_or_init(|| RwLock::new(EngineConfig::from_env()))
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("true") || v == "1"
        })
        .unwrap_or(false)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .filter(|&n| n > 0)
        .unwrap_or(default)
}

impl EngineConfig {
    /// Builds a configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            jit: if env_flag("DISABLE_JIT") {
                JitMode::Off
            } else {
                JitMode::Fast
            },
            fusion_enabled: !env_flag("DISABLE_FUSION"),
            async_concurrency: env_usize("NAGARE_ASYNC_CONCURRENCY", DEFAULT_ASYNC_CONCURRENCY),
            unroll_threshold: env_usize("NAGARE_UNROLL_THRESHOLD", DEFAULT_UNROLL_THRESHOLD),
        }
    }

    /// Returns a copy of the current process-wide configuration.
    ///
    /// Pipelines call this once at construction; the copy is immutable for
    /// the pipeline's lifetime.
    #[must_use]
    pub fn snapshot() -> Self {
        global().read().clone()
    }

    /// Replaces the process-wide configuration.
    ///
    /// Affects pipelines constructed after the call.
    pub fn install(config: EngineConfig) {
        *global().write() = config;
    }

    /// Restores the environment-derived configuration.
    pub fn reset() {
        Self::install(EngineConfig::from_env());
    }

    /// Returns true if array kernels may be used under this configuration.
    #[must_use]
    pub fn kernels_enabled(&self) -> bool {
        self.fusion_enabled && self.jit == JitMode::Fast
    }
}
