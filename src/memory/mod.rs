//! Byte accounting for device-resident buffers

use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct PoolState {
    allocated: usize,
    peak: usize,
}

/// Tracks the bytes a device currently holds. Cloning shares the counters.
#[derive(Debug, Clone, Default)]
pub struct DeviceMemoryPool {
    state: Arc<Mutex<PoolState>>,
}

impl DeviceMemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `size` bytes until the returned guard drops
    pub fn allocate(&self, size: usize) -> MemoryGuard {
        let mut state = self.state.lock();
        state.allocated += size;
        state.peak = state.peak.max(state.allocated);
        MemoryGuard {
            size,
            pool: self.clone(),
        }
    }

    fn release(&self, size: usize) {
        let mut state = self.state.lock();
        state.allocated = state.allocated.saturating_sub(size);
    }

    pub fn allocated(&self) -> usize {
        self.state.lock().allocated
    }

    pub fn peak(&self) -> usize {
        self.state.lock().peak
    }
}

/// Releases its bytes back to the pool on drop, including on error paths
#[derive(Debug)]
pub struct MemoryGuard {
    size: usize,
    pool: DeviceMemoryPool,
}

impl MemoryGuard {
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for MemoryGuard {
    fn drop(&mut self) {
        self.pool.release(self.size);
    }
}
