//! Where an array's storage lives

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Memory space of an array's storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    Cuda(usize),
    Metal(usize),
    Vulkan(usize),
    OpenCL(usize),
    /// Device memory emulated in host RAM, driven by the host worker pool
    Emulated(usize),
}

impl Device {
    /// Check if device is an offload target rather than host memory
    pub const fn is_accelerator(&self) -> bool {
        !matches!(self, Device::Cpu)
    }

    pub const fn ordinal(&self) -> usize {
        match self {
            Device::Cpu => 0,
            Device::Cuda(id)
            | Device::Metal(id)
            | Device::Vulkan(id)
            | Device::OpenCL(id)
            | Device::Emulated(id) => *id,
        }
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(id) => write!(f, "cuda:{}", id),
            Device::Metal(id) => write!(f, "metal:{}", id),
            Device::Vulkan(id) => write!(f, "vulkan:{}", id),
            Device::OpenCL(id) => write!(f, "opencl:{}", id),
            Device::Emulated(id) => write!(f, "emulated:{}", id),
        }
    }
}
