//! Runtime kernel registry keyed by `(tile size, element type)`.

use crate::device::{KernelHandle, KernelKind};
use crate::error::{DlrmError, Result};
use crate::types::DataType;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Tile sizes with compiled interaction kernels.
pub const TILE_SIZES: &[u32] = &[16, 32];

/// Default registry covering [`TILE_SIZES`] × [`DataType::ALL`].
pub static DEFAULT_REGISTRY: Lazy<KernelRegistry> = Lazy::new(|| {
    let mut registry = KernelRegistry::new();
    for &tile_size in TILE_SIZES {
        for data_type in DataType::ALL {
            registry.insert(KernelSet::standard(tile_size, data_type));
        }
    }
    registry
});

/// The three kernels one trial may launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSet {
    pub forward: KernelHandle,
    pub backward: KernelHandle,
    pub tril_reduction: KernelHandle,
}

impl KernelSet {
    /// Kernel set following the `dlrm_{fwd|bwd|tril}_t{tile}_{type}` naming.
    pub fn standard(tile_size: u32, data_type: DataType) -> Self {
        let handle = |prefix: &str, kind| KernelHandle {
            name: format!("dlrm_{prefix}_t{tile_size}_{data_type}"),
            kind,
            tile_size,
            data_type,
        };
        Self {
            forward: handle("fwd", KernelKind::Forward),
            backward: handle("bwd", KernelKind::Backward),
            tril_reduction: handle("tril", KernelKind::TrilReduction),
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.forward.tile_size
    }

    pub fn data_type(&self) -> DataType {
        self.forward.data_type
    }
}

/// Map from specialization to kernel set.
#[derive(Debug, Clone, Default)]
pub struct KernelRegistry {
    sets: HashMap<(u32, DataType), KernelSet>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kernel set, replacing any previous one for its key.
    pub fn insert(&mut self, set: KernelSet) {
        self.sets.insert((set.tile_size(), set.data_type()), set);
    }

    pub fn get(&self, tile_size: u32, data_type: DataType) -> Option<&KernelSet> {
        self.sets.get(&(tile_size, data_type))
    }

    /// Like [`get`](Self::get), but a missing entry is an error.
    pub fn lookup(&self, tile_size: u32, data_type: DataType) -> Result<&KernelSet> {
        self.get(tile_size, data_type)
            .ok_or(DlrmError::KernelNotFound {
                tile_size,
                data_type,
            })
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
