//! Array collaborator: element types, scalars and strided n-dimensional arrays
//!
//! - `DType` with the fixed safe-cast lattice used by type resolution
//! - `Scalar` values that kernels consume and produce
//! - `NdArray`: shared storage plus shape/strides/offset, so broadcast and
//!   sliced views never copy

pub mod core;
pub mod devices;
pub mod dtype;
pub mod iter;
pub mod scalar;
pub mod storage;

pub use self::core::{MemoryLayout, NdArray};
pub use devices::Device;
pub use dtype::DType;
pub use scalar::{Element, Scalar};
pub use storage::TensorStorage;
