use std::ops::Range;
use std::sync::Arc;

use crate::config::DeviceConfig;
use crate::device::{ComputeDevice, LaunchGrid};
use crate::error::{UfuncError, UfuncResult};
use crate::tensor::NdArray;
use super::{split_even, units_for, ChunkFn, ChunkOutput, LoopStrategy, StrategyKind};

/// Stages inputs on a compute device and launches every chunk as a grid
/// of blocks. Results come back block by block, in block order.
#[derive(Debug, Clone)]
pub struct DeviceLoop {
    device: Arc<dyn ComputeDevice>,
    config: DeviceConfig,
}

impl DeviceLoop {
    pub fn new(device: Arc<dyn ComputeDevice>, config: DeviceConfig) -> Self {
        Self { device, config }
    }

    pub fn device(&self) -> &Arc<dyn ComputeDevice> {
        &self.device
    }

    fn ensure_available(&self) -> UfuncResult<()> {
        if self.device.is_available() {
            Ok(())
        } else {
            Err(UfuncError::device(&self.device.device().to_string(), "device is not available"))
        }
    }
}

impl LoopStrategy for DeviceLoop {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Device
    }

    fn partition(&self, len: usize, unit_cost: usize) -> Vec<Range<usize>> {
        split_even(len, units_for(self.config.chunk_len, unit_cost))
    }

    fn stage(&self, inputs: &[NdArray]) -> UfuncResult<Vec<NdArray>> {
        self.ensure_available()?;
        inputs.iter().map(|array| self.device.upload(array)).collect()
    }

    fn run_chunks(&self, chunks: Vec<Range<usize>>, work: ChunkFn) -> UfuncResult<Vec<ChunkOutput>> {
        self.ensure_available()?;
        let mut outputs = Vec::with_capacity(chunks.len());
        for range in chunks {
            let grid = LaunchGrid::for_len(range.len(), self.config.threads_per_block);
            tracing::trace!("launching {:?} on {} as {} block(s)", range, self.device.device(), grid.blocks);
            let buffer = self.device.launch(grid, range, &work)?;
            outputs.extend(self.device.download(buffer)?);
        }
        Ok(outputs)
    }
}
