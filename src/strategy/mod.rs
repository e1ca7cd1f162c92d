//! Loop strategies: how the planned index space is split into chunks and
//! where each chunk runs.
//!
//! A strategy never sees dtypes or kernels. Ufunc operations hand it a
//! [`ChunkFn`] that evaluates a range of flat positions, and the strategy
//! decides partitioning, placement and ordering of the results.

pub mod basic;
pub mod device;
pub mod parallel;
pub mod stream;

use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::VectorizeConfig;
use crate::device::{open_device, ComputeDevice};
use crate::error::{UfuncError, UfuncResult};
use crate::tensor::{NdArray, Scalar};

pub use basic::BasicLoop;
pub use device::DeviceLoop;
pub use parallel::ParallelLoop;
pub use stream::StreamLoop;

/// Selects the loop a built ufunc runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Single-threaded loop on the calling thread
    Basic,
    /// Chunks spread over the shared worker pool
    Parallel,
    /// Chunks submitted to the stream runtime with bounded in-flight work
    Stream,
    /// Inputs staged on a compute device, chunks launched as kernels
    Device,
    /// Core-dimension loop of a generalized-signature ufunc
    Generalized,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StrategyKind::Basic => "basic",
            StrategyKind::Parallel => "parallel",
            StrategyKind::Stream => "stream",
            StrategyKind::Device => "device",
            StrategyKind::Generalized => "generalized",
        };
        write!(f, "{}", name)
    }
}

/// Evaluates flat positions `range` and returns their values in order.
/// For folds it returns the partial result of the range instead.
pub type ChunkFn = Arc<dyn Fn(Range<usize>) -> UfuncResult<Vec<Scalar>> + Send + Sync>;

/// Wrap a closure as a [`ChunkFn`]
pub fn chunk_fn<F>(work: F) -> ChunkFn
where
    F: Fn(Range<usize>) -> UfuncResult<Vec<Scalar>> + Send + Sync + 'static,
{
    Arc::new(work)
}

/// Combines two adjacent partial results, left then right
pub type MergeFn<'a> = &'a dyn Fn(Vec<Scalar>, Vec<Scalar>) -> UfuncResult<Vec<Scalar>>;

/// Values produced for one chunk of the index space
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutput {
    pub range: Range<usize>,
    pub values: Vec<Scalar>,
}

pub trait LoopStrategy: Send + Sync + Debug {
    fn kind(&self) -> StrategyKind;

    /// Ordered, disjoint chunks covering `0..len`. `unit_cost` is the
    /// number of elements one position touches.
    fn partition(&self, len: usize, unit_cost: usize) -> Vec<Range<usize>>;

    /// Make inputs resident where the chunks will run
    fn stage(&self, inputs: &[NdArray]) -> UfuncResult<Vec<NdArray>> {
        Ok(inputs.to_vec())
    }

    /// Run `work` over every chunk. Outputs come back in chunk order and may
    /// be finer grained than `chunks`, but always cover them in order.
    fn run_chunks(&self, chunks: Vec<Range<usize>>, work: ChunkFn) -> UfuncResult<Vec<ChunkOutput>>;

    /// Elementwise map over `0..len`, concatenated in index order
    fn map(&self, len: usize, unit_cost: usize, work: ChunkFn) -> UfuncResult<Vec<Scalar>> {
        let outputs = self.run_chunks(self.partition(len, unit_cost), work)?;
        let mut values = Vec::with_capacity(len);
        for output in outputs {
            values.extend(output.values);
        }
        Ok(values)
    }

    /// Partial results per chunk, merged left to right in chunk order
    fn fold(&self, len: usize, unit_cost: usize, work: ChunkFn, merge: MergeFn<'_>) -> UfuncResult<Vec<Scalar>> {
        let outputs = self.run_chunks(self.partition(len, unit_cost), work)?;
        let mut outputs = outputs.into_iter();
        let first = outputs
            .next()
            .ok_or_else(|| UfuncError::Internal("fold over an empty index space".to_string()))?;
        outputs.try_fold(first.values, |acc, next| merge(acc, next.values))
    }
}

/// Split `0..len` into consecutive ranges of at most `chunk_len`
pub fn split_even(len: usize, chunk_len: usize) -> Vec<Range<usize>> {
    let chunk_len = chunk_len.max(1);
    (0..len)
        .step_by(chunk_len)
        .map(|start| start..(start + chunk_len).min(len))
        .collect()
}

/// Positions per chunk so a chunk touches about `elements` elements
pub(crate) fn units_for(elements: usize, unit_cost: usize) -> usize {
    let unit_cost = unit_cost.max(1);
    ((elements + unit_cost - 1) / unit_cost).max(1)
}

/// Build the strategy object for `kind`. `device` overrides the device
/// named in the configuration.
pub fn create_strategy(
    kind: StrategyKind,
    config: &VectorizeConfig,
    device: Option<Arc<dyn ComputeDevice>>,
) -> Arc<dyn LoopStrategy> {
    match kind {
        StrategyKind::Basic => Arc::new(BasicLoop::new()),
        StrategyKind::Generalized => Arc::new(BasicLoop::generalized()),
        StrategyKind::Parallel => Arc::new(ParallelLoop::new(config.parallel.clone())),
        StrategyKind::Stream => Arc::new(StreamLoop::new(config.stream.clone())),
        StrategyKind::Device => {
            let device = device.unwrap_or_else(|| open_device(config.device.device, config.parallel.num_worker_threads));
            Arc::new(DeviceLoop::new(device, config.device.clone()))
        }
    }
}
