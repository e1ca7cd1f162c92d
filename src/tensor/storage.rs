use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::memory::MemoryGuard;
use super::devices::Device;

/// Raw element bytes shared between an array and all of its views
#[derive(Debug)]
pub struct TensorStorage {
    data: RwLock<Box<[u8]>>,
    device: Device,
    /// Device memory reserved for these bytes, released with the storage
    memory: Option<MemoryGuard>,
}

impl TensorStorage {
    pub fn new(size: usize, device: Device) -> Self {
        Self {
            data: RwLock::new(vec![0u8; size].into_boxed_slice()),
            device,
            memory: None,
        }
    }

    pub fn from_vec(data: Vec<u8>, device: Device) -> Self {
        Self {
            data: RwLock::new(data.into_boxed_slice()),
            device,
            memory: None,
        }
    }

    /// Shared access for loops reading inputs. Recursive, since one call
    /// may read the same storage through several operands.
    pub fn read(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.data.read_recursive()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.data.write()
    }

    pub fn size(&self) -> usize {
        self.data.read_recursive().len()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Copy the bytes into a new storage resident on `device`
    pub fn transfer_to(&self, device: Device) -> Self {
        let data = self.data.read_recursive().clone();
        Self {
            data: RwLock::new(data),
            device,
            memory: None,
        }
    }

    /// Keep `memory` reserved for as long as this storage lives
    pub(crate) fn holding(mut self, memory: MemoryGuard) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Bytes reserved on the device for this storage, if any
    pub fn reserved(&self) -> usize {
        self.memory.as_ref().map_or(0, |m| m.size())
    }
}
