//! Device profiles and stream policy.

use crate::error::Result;
use dlrm_bench::{Architecture, DataType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Largest block the simulated device accepts.
pub const MAX_THREADS_PER_BLOCK: u64 = 1024;

/// How queued launches are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamOrdering {
    /// Every launch runs to completion before `launch` returns.
    #[default]
    InOrder,
    /// Launches are queued and only run at the next synchronization point,
    /// newest first. Work that is not joined by an event wait observes
    /// stale inputs.
    Unordered,
}

/// Hardware description of a simulated device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimProfile {
    pub name: String,
    pub architecture: Architecture,
    pub warp_size: u32,
    /// LDS bytes available to one block.
    pub shared_memory_bytes: u32,
    /// Peak GFLOP/s by element type; missing entries count as zero.
    pub peak_gflops: BTreeMap<DataType, f64>,
    /// Fixed cost of every launch on the simulated clock.
    #[serde(default = "default_launch_latency_ms")]
    pub launch_latency_ms: f64,
    /// Fraction of peak achieved by the interaction kernels.
    #[serde(default = "default_sustained_fraction")]
    pub sustained_fraction: f64,
    #[serde(default)]
    pub ordering: StreamOrdering,
}

fn default_launch_latency_ms() -> f64 {
    0.005
}

fn default_sustained_fraction() -> f64 {
    0.6
}

fn peaks(entries: &[(DataType, f64)]) -> BTreeMap<DataType, f64> {
    entries.iter().copied().collect()
}

impl SimProfile {
    /// MI100-class device.
    pub fn gfx908() -> Self {
        Self {
            name: "gfx908".into(),
            architecture: Architecture::Gfx908,
            warp_size: 64,
            shared_memory_bytes: 65536,
            peak_gflops: peaks(&[
                (DataType::F16, 184_600.0),
                (DataType::H16, 184_600.0),
                (DataType::BF16, 92_300.0),
                (DataType::F32, 46_100.0),
                (DataType::F64, 11_500.0),
                (DataType::I8, 184_600.0),
            ]),
            launch_latency_ms: default_launch_latency_ms(),
            sustained_fraction: default_sustained_fraction(),
            ordering: StreamOrdering::InOrder,
        }
    }

    /// MI200-class device.
    pub fn gfx90a() -> Self {
        Self {
            name: "gfx90a".into(),
            architecture: Architecture::Gfx90a,
            warp_size: 64,
            shared_memory_bytes: 65536,
            peak_gflops: peaks(&[
                (DataType::F16, 383_000.0),
                (DataType::H16, 383_000.0),
                (DataType::BF16, 383_000.0),
                (DataType::F32, 95_700.0),
                (DataType::F64, 95_700.0),
                (DataType::I8, 383_000.0),
            ]),
            launch_latency_ms: default_launch_latency_ms(),
            sustained_fraction: default_sustained_fraction(),
            ordering: StreamOrdering::InOrder,
        }
    }

    /// RDNA3 device, wave32.
    pub fn gfx1100() -> Self {
        Self {
            name: "gfx1100".into(),
            architecture: Architecture::Gfx1100,
            warp_size: 32,
            shared_memory_bytes: 65536,
            peak_gflops: peaks(&[
                (DataType::F16, 122_800.0),
                (DataType::H16, 122_800.0),
                (DataType::BF16, 122_800.0),
                (DataType::F32, 61_400.0),
                (DataType::F64, 960.0),
                (DataType::I8, 122_800.0),
            ]),
            launch_latency_ms: default_launch_latency_ms(),
            sustained_fraction: default_sustained_fraction(),
            ordering: StreamOrdering::InOrder,
        }
    }

    /// Preset for a device arch string such as `gfx90a:sramecc+:xnack-`.
    pub fn for_gcn_name(gcn_name: &str) -> Option<Self> {
        match Architecture::from_gcn_name(gcn_name) {
            Architecture::Gfx908 => Some(Self::gfx908()),
            Architecture::Gfx90a => Some(Self::gfx90a()),
            Architecture::Gfx1100 => Some(Self::gfx1100()),
            _ => None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_ordering(mut self, ordering: StreamOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn peak_gflops_per_sec(&self, data_type: DataType) -> f64 {
        self.peak_gflops.get(&data_type).copied().unwrap_or(0.0)
    }

    /// Simulated duration of a launch performing `gflop` of work.
    pub fn launch_cost_ms(&self, data_type: DataType, gflop: f64) -> f64 {
        let rate = self.peak_gflops_per_sec(data_type) * self.sustained_fraction;
        if rate <= 0.0 {
            return self.launch_latency_ms;
        }
        self.launch_latency_ms + gflop / rate * 1.0e3
    }
}

impl Default for SimProfile {
    fn default() -> Self {
        Self::gfx90a()
    }
}
