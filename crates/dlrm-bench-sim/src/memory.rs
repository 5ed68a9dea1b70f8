//! Simulated device memory.
//!
//! Buffers hold `f64` values that are always representable in their
//! element type: every write goes through [`DataType::quantize`].

use crate::error::{Result, SimError};
use dlrm_bench::{DataType, DeviceBuffer};
use std::collections::HashMap;

// ============================================================================
// Helper: validate ranges
// ============================================================================

fn validate_range(buffer: u64, len: usize, offset: usize, count: usize) -> Result<()> {
    match offset.checked_add(count) {
        Some(end) if end <= len => Ok(()),
        _ => Err(SimError::DimensionMismatch(format!(
            "buffer {buffer}: range {offset}..{} exceeds {len} elements",
            offset.saturating_add(count)
        ))),
    }
}

#[derive(Debug)]
struct Allocation {
    data_type: DataType,
    data: Vec<f64>,
}

/// Every live allocation of one simulated device.
#[derive(Debug, Default)]
pub struct SimMemory {
    buffers: HashMap<u64, Allocation>,
    next_id: u64,
}

impl SimMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zeroed buffer.
    pub fn alloc(&mut self, data_type: DataType, len: usize) -> DeviceBuffer {
        self.next_id += 1;
        let id = self.next_id;
        self.buffers.insert(
            id,
            Allocation {
                data_type,
                data: vec![0.0; len],
            },
        );
        DeviceBuffer::new(id, len, data_type)
    }

    pub fn free(&mut self, id: u64) -> Result<()> {
        self.buffers
            .remove(&id)
            .map(|_| ())
            .ok_or(SimError::UnknownBuffer(id))
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Whole contents of a buffer.
    pub fn read(&self, id: u64) -> Result<&[f64]> {
        self.buffers
            .get(&id)
            .map(|a| a.data.as_slice())
            .ok_or(SimError::UnknownBuffer(id))
    }

    /// `count` elements starting at `offset`.
    pub fn read_range(&self, id: u64, offset: usize, count: usize) -> Result<&[f64]> {
        let data = self.read(id)?;
        validate_range(id, data.len(), offset, count)?;
        Ok(&data[offset..offset + count])
    }

    /// Overwrite a range, rounding every value to the element type.
    pub fn write_range(&mut self, id: u64, offset: usize, values: &[f64]) -> Result<()> {
        let alloc = self.buffers.get_mut(&id).ok_or(SimError::UnknownBuffer(id))?;
        validate_range(id, alloc.data.len(), offset, values.len())?;
        let data_type = alloc.data_type;
        for (dst, &v) in alloc.data[offset..].iter_mut().zip(values) {
            *dst = data_type.quantize(v);
        }
        Ok(())
    }

    /// Replace the whole buffer; `values` must match its length.
    pub fn write(&mut self, id: u64, values: &[f64]) -> Result<()> {
        let len = self.read(id)?.len();
        if values.len() != len {
            return Err(SimError::DimensionMismatch(format!(
                "buffer {id}: expected {len} elements, got {}",
                values.len()
            )));
        }
        self.write_range(id, 0, values)
    }

    pub fn data_type(&self, id: u64) -> Result<DataType> {
        self.buffers
            .get(&id)
            .map(|a| a.data_type)
            .ok_or(SimError::UnknownBuffer(id))
    }
}
