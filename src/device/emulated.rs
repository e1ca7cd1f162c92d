//! A device backed by the host worker pool, with its own memory
//! accounting and optional injected failures.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::error::{UfuncError, UfuncResult};
use crate::executor::worker_pool;
use crate::memory::DeviceMemoryPool;
use crate::strategy::{ChunkFn, ChunkOutput};
use crate::tensor::{Device, NdArray, Scalar};
use super::{ComputeDevice, DeviceBuffer, LaunchGrid};

/// Fail the given stage once it has succeeded `after` times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFault {
    Upload { after: usize },
    Launch { after: usize },
    Download { after: usize },
}

#[derive(Debug)]
pub struct EmulatedDevice {
    device: Device,
    worker_threads: usize,
    memory: DeviceMemoryPool,
    fault: Option<DeviceFault>,
    uploads: AtomicUsize,
    launches: AtomicUsize,
    downloads: AtomicUsize,
}

impl EmulatedDevice {
    pub fn new(device: Device, worker_threads: usize) -> Self {
        Self {
            device,
            worker_threads,
            memory: DeviceMemoryPool::new(),
            fault: None,
            uploads: AtomicUsize::new(0),
            launches: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn with_fault(mut self, fault: DeviceFault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn memory(&self) -> &DeviceMemoryPool {
        &self.memory
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    fn check(&self, stage: &str, counter: &AtomicUsize, limit: Option<usize>) -> UfuncResult<()> {
        let done = counter.fetch_add(1, Ordering::SeqCst);
        match limit {
            Some(after) if done >= after => Err(UfuncError::device(
                &self.device.to_string(),
                &format!("{} failed after {} successful call(s)", stage, after),
            )),
            _ => Ok(()),
        }
    }
}

impl ComputeDevice for EmulatedDevice {
    fn device(&self) -> Device {
        self.device
    }

    fn is_available(&self) -> bool {
        true
    }

    fn upload(&self, array: &NdArray) -> UfuncResult<NdArray> {
        let limit = match self.fault {
            Some(DeviceFault::Upload { after }) => Some(after),
            _ => None,
        };
        self.check("upload", &self.uploads, limit)?;
        let memory = self.memory.allocate(array.len() * array.dtype().size());
        Ok(array.to_device_holding(self.device, memory))
    }

    fn launch(&self, grid: LaunchGrid, range: Range<usize>, work: &ChunkFn) -> UfuncResult<DeviceBuffer> {
        let limit = match self.fault {
            Some(DeviceFault::Launch { after }) => Some(after),
            _ => None,
        };
        self.check("launch", &self.launches, limit)?;

        let memory = self.memory.allocate(range.len() * std::mem::size_of::<Scalar>());
        let pool = worker_pool(self.worker_threads)?;
        let outputs = pool.install(|| {
            (0..grid.blocks)
                .into_par_iter()
                .map(|block| {
                    let block_range = grid.block_range(&range, block);
                    let values = work(block_range.clone())?;
                    Ok(ChunkOutput {
                        range: block_range,
                        values,
                    })
                })
                .collect::<UfuncResult<Vec<_>>>()
        })?;
        Ok(DeviceBuffer::new(self.device, outputs, memory))
    }

    fn download(&self, buffer: DeviceBuffer) -> UfuncResult<Vec<ChunkOutput>> {
        let limit = match self.fault {
            Some(DeviceFault::Download { after }) => Some(after),
            _ => None,
        };
        self.check("download", &self.downloads, limit)?;
        Ok(buffer.into_outputs())
    }
}
