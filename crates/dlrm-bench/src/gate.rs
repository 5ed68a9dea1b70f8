//! Compatibility checks deciding whether a trial may run on a device.
//!
//! Three independent predicates must all hold:
//!
//! - **device**: the architecture is supported, gfx908 is not paired with
//!   f64, and the gfx11 family only runs f16/bf16/i8 with 16×16 tiles;
//! - **sizes**: `M` and `K` are non-zero tile multiples and the block's
//!   x-extent is a tile multiple;
//! - **lds**: the kernel's shared memory fits the device.
//!
//! A failed gate is not an error; the trial is reported as `SKIPPED`.

use crate::config::ProblemConfig;
use crate::device::DeviceCapabilities;
use crate::types::{Architecture, DataType};

/// Shared memory required by the interaction kernels.
pub const KERNEL_LDS_BYTES: u32 = 0;

/// Per-predicate gate outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateReport {
    pub device: bool,
    pub sizes: bool,
    pub lds: bool,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.device && self.sizes && self.lds
    }

    /// Names of the failed predicates, for logging.
    pub fn failures(&self) -> Vec<&'static str> {
        [
            (self.device, "device"),
            (self.sizes, "sizes"),
            (self.lds, "lds"),
        ]
        .into_iter()
        .filter_map(|(ok, name)| (!ok).then_some(name))
        .collect()
    }
}

/// Architecture / element type / tile size support.
pub fn check_device(arch: Architecture, data_type: DataType, tile_size: u32) -> bool {
    let is_f64 = data_type == DataType::F64;
    let is_gfx11_type = data_type.is_f16() || matches!(data_type, DataType::BF16 | DataType::I8);

    let supported = arch != Architecture::Unsupported;
    let gfx908_f64 = !(arch.is_gfx908() && is_f64);
    let gfx11 = !(arch.is_gfx11() && (!is_gfx11_type || tile_size != 16));

    supported && gfx908_f64 && gfx11
}

/// Shape legality for the fast path.
pub fn check_sizes(config: &ProblemConfig) -> bool {
    let tile = config.tile_size();
    let m = config.m();
    let k = config.k();
    m >= tile && m % tile == 0 && k >= tile && k % tile == 0 && config.block_x() % tile == 0
}

/// Shared memory requirement fits the device.
pub fn check_lds(required_bytes: u32, capacity_bytes: u32) -> bool {
    required_bytes <= capacity_bytes
}

/// Evaluate every predicate against a device.
pub fn evaluate<D: DeviceCapabilities + ?Sized>(config: &ProblemConfig, device: &D) -> GateReport {
    GateReport {
        device: check_device(device.architecture(), config.data_type(), config.tile_size()),
        sizes: check_sizes(config),
        lds: check_lds(KERNEL_LDS_BYTES, device.shared_memory_capacity()),
    }
}

/// Whether the configuration can run on the device.
pub fn is_runnable<D: DeviceCapabilities + ?Sized>(config: &ProblemConfig, device: &D) -> bool {
    evaluate(config, device).passed()
}
