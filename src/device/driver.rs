use std::ops::Range;

use crate::error::{UfuncError, UfuncResult};
use crate::strategy::{ChunkFn, ChunkOutput};
use crate::tensor::{Device, NdArray};
use super::{ComputeDevice, DeviceBuffer, LaunchGrid};

/// Hardware accelerator reached through a vendor driver. No driver is
/// linked into this build, so every operation reports the device as absent.
#[derive(Debug, Clone)]
pub struct DriverDevice {
    device: Device,
}

impl DriverDevice {
    pub fn new(device: Device) -> Self {
        Self { device }
    }

    fn unavailable(&self) -> UfuncError {
        UfuncError::device(&self.device.to_string(), "no driver is available for this device")
    }
}

impl ComputeDevice for DriverDevice {
    fn device(&self) -> Device {
        self.device
    }

    fn is_available(&self) -> bool {
        false
    }

    fn upload(&self, _array: &NdArray) -> UfuncResult<NdArray> {
        Err(self.unavailable())
    }

    fn launch(&self, _grid: LaunchGrid, _range: Range<usize>, _work: &ChunkFn) -> UfuncResult<DeviceBuffer> {
        Err(self.unavailable())
    }

    fn download(&self, _buffer: DeviceBuffer) -> UfuncResult<Vec<ChunkOutput>> {
        Err(self.unavailable())
    }
}
