use std::ops::Range;

use rayon::prelude::*;

use crate::config::ParallelConfig;
use crate::error::{UfuncError, UfuncResult};
use crate::executor::worker_pool;
use crate::tensor::Scalar;
use super::{split_even, units_for, ChunkFn, ChunkOutput, LoopStrategy, StrategyKind};

/// Spreads chunks over the shared worker pool. Each worker writes a
/// disjoint slice of the output, so no ordering is lost.
#[derive(Debug, Clone)]
pub struct ParallelLoop {
    config: ParallelConfig,
}

impl ParallelLoop {
    pub fn new(config: ParallelConfig) -> Self {
        Self { config }
    }

    fn chunk_len(&self, len: usize, unit_cost: usize) -> usize {
        let workers = self.config.num_worker_threads.max(1);
        let floor = units_for(self.config.min_chunk_len, unit_cost);
        ((len + workers - 1) / workers).max(floor)
    }
}

impl LoopStrategy for ParallelLoop {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Parallel
    }

    fn partition(&self, len: usize, unit_cost: usize) -> Vec<Range<usize>> {
        split_even(len, self.chunk_len(len, unit_cost))
    }

    fn run_chunks(&self, chunks: Vec<Range<usize>>, work: ChunkFn) -> UfuncResult<Vec<ChunkOutput>> {
        let pool = worker_pool(self.config.num_worker_threads)?;
        pool.install(|| {
            chunks
                .into_par_iter()
                .map(|range| {
                    let values = work(range.clone())?;
                    Ok(ChunkOutput { range, values })
                })
                .collect()
        })
    }

    fn map(&self, len: usize, unit_cost: usize, work: ChunkFn) -> UfuncResult<Vec<Scalar>> {
        let mut values = vec![Scalar::Bool(false); len];
        if len == 0 {
            return Ok(values);
        }
        let chunk_len = self.chunk_len(len, unit_cost);
        let pool = worker_pool(self.config.num_worker_threads)?;
        pool.install(|| {
            values
                .par_chunks_mut(chunk_len)
                .enumerate()
                .try_for_each(|(i, slot)| -> UfuncResult<()> {
                    let start = i * chunk_len;
                    let produced = work(start..start + slot.len())?;
                    if produced.len() != slot.len() {
                        return Err(UfuncError::Internal(format!(
                            "chunk at {} produced {} values for {} slots",
                            start,
                            produced.len(),
                            slot.len()
                        )));
                    }
                    slot.copy_from_slice(&produced);
                    Ok(())
                })
        })?;
        Ok(values)
    }
}
