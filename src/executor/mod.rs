//! Process-wide execution resources shared by every ufunc.
//!
//! Both are built lazily on first use and live until the process exits.
//! The thread count requested by the first caller wins.

use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use rayon::ThreadPool;
use tokio::runtime::{Builder, Runtime};

use crate::error::{UfuncError, UfuncResult};

lazy_static! {
    static ref WORKER_POOL: Mutex<Option<Arc<ThreadPool>>> = Mutex::new(None);
    static ref STREAM_RUNTIME: Mutex<Option<Arc<Runtime>>> = Mutex::new(None);
}

/// Worker pool used by the parallel loop and the emulated device
pub fn worker_pool(num_threads: usize) -> UfuncResult<Arc<ThreadPool>> {
    let mut slot = WORKER_POOL.lock();
    if let Some(pool) = slot.as_ref() {
        return Ok(pool.clone());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("vectorize-worker-{}", i))
        .build()
        .map_err(|e| UfuncError::Internal(format!("failed to build worker pool: {}", e)))?;
    tracing::debug!("started worker pool with {} threads", num_threads);
    let pool = Arc::new(pool);
    *slot = Some(pool.clone());
    Ok(pool)
}

/// Runtime the stream loop drives its submissions on
pub fn stream_runtime(num_threads: usize) -> UfuncResult<Arc<Runtime>> {
    let mut slot = STREAM_RUNTIME.lock();
    if let Some(runtime) = slot.as_ref() {
        return Ok(runtime.clone());
    }
    let runtime = Builder::new_multi_thread()
        .worker_threads(num_threads)
        .max_blocking_threads(num_threads)
        .thread_name("vectorize-stream")
        .build()
        .map_err(|e| UfuncError::Internal(format!("failed to build stream runtime: {}", e)))?;
    tracing::debug!("started stream runtime with {} threads", num_threads);
    let runtime = Arc::new(runtime);
    *slot = Some(runtime.clone());
    Ok(runtime)
}
