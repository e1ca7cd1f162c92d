use std::collections::VecDeque;
use std::ops::Range;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::StreamConfig;
use crate::error::{UfuncError, UfuncResult};
use crate::executor::stream_runtime;
use crate::tensor::Scalar;
use super::{split_even, units_for, ChunkFn, ChunkOutput, LoopStrategy, StrategyKind};

type Pending = (Range<usize>, JoinHandle<UfuncResult<Vec<Scalar>>>);

/// Submits chunks to the stream runtime and writes results back in
/// submission order, with at most `max_in_flight` chunks outstanding.
#[derive(Debug, Clone)]
pub struct StreamLoop {
    config: StreamConfig,
}

impl StreamLoop {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }
}

async fn finish(range: Range<usize>, handle: JoinHandle<UfuncResult<Vec<Scalar>>>) -> UfuncResult<ChunkOutput> {
    let values = handle
        .await
        .map_err(|e| UfuncError::Internal(format!("stream chunk {:?} did not complete: {}", range, e)))??;
    Ok(ChunkOutput { range, values })
}

impl LoopStrategy for StreamLoop {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Stream
    }

    fn partition(&self, len: usize, unit_cost: usize) -> Vec<Range<usize>> {
        split_even(len, units_for(self.config.chunk_len, unit_cost))
    }

    fn run_chunks(&self, chunks: Vec<Range<usize>>, work: ChunkFn) -> UfuncResult<Vec<ChunkOutput>> {
        // blocking here would stall the caller's own runtime
        if Handle::try_current().is_ok() {
            return Err(UfuncError::InvalidState(
                "the stream loop cannot be driven from inside an async runtime".to_string(),
            ));
        }
        let runtime = stream_runtime(self.config.runtime_threads)?;
        let max_in_flight = self.config.max_in_flight.max(1);

        runtime.block_on(async move {
            let mut outputs = Vec::with_capacity(chunks.len());
            let mut pending: VecDeque<Pending> = VecDeque::with_capacity(max_in_flight);
            let mut failure = None;
            for range in chunks {
                if pending.len() >= max_in_flight {
                    if let Some((done, handle)) = pending.pop_front() {
                        match finish(done, handle).await {
                            Ok(output) => outputs.push(output),
                            Err(err) => {
                                failure = Some(err);
                                break;
                            }
                        }
                    }
                }
                let task = work.clone();
                let submitted = range.clone();
                pending.push_back((range, tokio::task::spawn_blocking(move || task(submitted))));
            }
            // every submitted chunk finishes before the call returns
            while let Some((done, handle)) = pending.pop_front() {
                match finish(done, handle).await {
                    Ok(output) if failure.is_none() => outputs.push(output),
                    Ok(_) => {}
                    Err(err) => {
                        failure.get_or_insert(err);
                    }
                }
            }
            match failure {
                Some(err) => Err(err),
                None => Ok(outputs),
            }
        })
    }
}
