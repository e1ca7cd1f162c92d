//! Vectorize - type-specialized universal functions for Rust
//!
//! Features:
//! - Elementwise and generalized (core-dimension) ufuncs built from one scalar body
//! - Ordered specialization tables with exact-then-upcast type resolution
//! - NumPy broadcasting over strided, zero-copy views
//! - Loop strategies: single-threaded, worker pool, bounded stream, device offload
//! - Reduce, accumulate and outer on binary ufuncs
//! - Device offload with host fallback

pub mod config;
pub mod device;
pub mod error;
pub mod executor;
pub mod memory;
pub mod strategy;
pub mod tensor;
pub mod ufunc;

pub use config::{ConfigBuilder, VectorizeConfig};
pub use error::{ErrorCode, UfuncError, UfuncResult};
pub use strategy::{LoopStrategy, StrategyKind};
pub use tensor::{DType, Device, Element, MemoryLayout, NdArray, Scalar};
pub use ufunc::{ExecutionReport, ScalarFunction, Signature, Ufunc, Vectorizer};

/// Install the default `tracing` subscriber. Verbose logging in the
/// process configuration lowers the level to DEBUG. A subscriber the host
/// application already installed is left in place.
pub fn init() -> UfuncResult<()> {
    let level = if config::get_config().development.verbose_logging {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
    tracing::info!("vectorize {} initialized", version());
    Ok(())
}

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
