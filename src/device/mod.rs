//! Compute devices the device loop stages inputs on and launches chunks to

pub mod driver;
pub mod emulated;

use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;

use crate::error::UfuncResult;
use crate::memory::MemoryGuard;
use crate::strategy::{ChunkFn, ChunkOutput};
use crate::tensor::{Device, NdArray};

pub use driver::DriverDevice;
pub use emulated::{DeviceFault, EmulatedDevice};

/// Blocks of threads covering one launched range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGrid {
    pub blocks: usize,
    pub threads_per_block: usize,
}

impl LaunchGrid {
    pub fn for_len(len: usize, threads_per_block: usize) -> Self {
        let threads_per_block = threads_per_block.max(1);
        Self {
            blocks: (len + threads_per_block - 1) / threads_per_block,
            threads_per_block,
        }
    }

    /// Positions handled by block `block` of a launch over `range`
    pub fn block_range(&self, range: &Range<usize>, block: usize) -> Range<usize> {
        let start = range.start + block * self.threads_per_block;
        start.min(range.end)..(start + self.threads_per_block).min(range.end)
    }
}

/// Results of one launch, still resident on the device. Dropping the
/// buffer releases its device memory.
#[derive(Debug)]
pub struct DeviceBuffer {
    device: Device,
    outputs: Vec<ChunkOutput>,
    _memory: MemoryGuard,
}

impl DeviceBuffer {
    pub fn new(device: Device, outputs: Vec<ChunkOutput>, memory: MemoryGuard) -> Self {
        Self {
            device,
            outputs,
            _memory: memory,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn into_outputs(self) -> Vec<ChunkOutput> {
        self.outputs
    }
}

pub trait ComputeDevice: Send + Sync + Debug {
    fn device(&self) -> Device;

    fn is_available(&self) -> bool;

    /// Copy an input into device memory
    fn upload(&self, array: &NdArray) -> UfuncResult<NdArray>;

    /// Run `work` over `range`, one invocation per block of `grid`
    fn launch(&self, grid: LaunchGrid, range: Range<usize>, work: &ChunkFn) -> UfuncResult<DeviceBuffer>;

    /// Copy a launch's results back to the host
    fn download(&self, buffer: DeviceBuffer) -> UfuncResult<Vec<ChunkOutput>>;
}

/// Device handle for `device`. Only emulated devices have a backend.
pub fn open_device(device: Device, worker_threads: usize) -> Arc<dyn ComputeDevice> {
    match device {
        Device::Emulated(_) => Arc::new(EmulatedDevice::new(device, worker_threads)),
        other => Arc::new(DriverDevice::new(other)),
    }
}
