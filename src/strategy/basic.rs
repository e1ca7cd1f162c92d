use std::ops::Range;

use crate::error::UfuncResult;
use super::{ChunkFn, ChunkOutput, LoopStrategy, StrategyKind};

/// Runs the whole index space as one chunk on the calling thread
#[derive(Debug, Clone)]
pub struct BasicLoop {
    kind: StrategyKind,
}

impl BasicLoop {
    pub fn new() -> Self {
        Self {
            kind: StrategyKind::Basic,
        }
    }

    /// Same loop, reported as the generalized-signature strategy
    pub fn generalized() -> Self {
        Self {
            kind: StrategyKind::Generalized,
        }
    }
}

impl Default for BasicLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopStrategy for BasicLoop {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn partition(&self, len: usize, _unit_cost: usize) -> Vec<Range<usize>> {
        if len == 0 {
            Vec::new()
        } else {
            vec![0..len]
        }
    }

    fn run_chunks(&self, chunks: Vec<Range<usize>>, work: ChunkFn) -> UfuncResult<Vec<ChunkOutput>> {
        chunks
            .into_iter()
            .map(|range| {
                let values = work(range.clone())?;
                Ok(ChunkOutput { range, values })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Scalar;
    use crate::strategy::chunk_fn;

    #[test]
    fn test_single_chunk() {
        let basic = BasicLoop::new();
        assert_eq!(basic.partition(100, 1), vec![0..100]);
        assert!(basic.partition(0, 1).is_empty());
    }

    #[test]
    fn test_map_and_fold() {
        let basic = BasicLoop::new();
        let work = chunk_fn(|range: Range<usize>| Ok(range.map(|i| Scalar::I64(i as i64)).collect()));
        let values = basic.map(5, 1, work).unwrap();
        assert_eq!(values.len(), 5);
        assert_eq!(values[4], Scalar::I64(4));

        let sum = chunk_fn(|range: Range<usize>| Ok(vec![Scalar::I64(range.map(|i| i as i64).sum())]));
        let merge = |a: Vec<Scalar>, b: Vec<Scalar>| -> UfuncResult<Vec<Scalar>> { Ok(vec![a[0] + b[0]]) };
        assert_eq!(basic.fold(5, 1, sum, &merge).unwrap(), vec![Scalar::I64(10)]);
    }
}
