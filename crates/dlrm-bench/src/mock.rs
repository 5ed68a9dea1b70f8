//! Call-recording accelerator for unit tests.

use crate::device::{
    Accelerator, Comparison, DeviceBuffer, DeviceCapabilities, EventId, KernelArgs, KernelHandle,
    LaunchConfig,
};
use crate::error::{DlrmError, Result};
use crate::types::{Architecture, DataType};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Alloc(u64, usize),
    Free(u64),
    Fill(u64, u64),
    Launch(String),
    Record(EventId),
    Sync(EventId),
    Destroy(EventId),
    Compare(u64, u64),
}

impl Call {
    pub(crate) fn label(&self) -> String {
        match self {
            Call::Alloc(..) => "alloc".into(),
            Call::Free(_) => "free".into(),
            Call::Fill(..) => "fill".into(),
            Call::Launch(name) => format!("launch:{name}"),
            Call::Record(_) => "record".into(),
            Call::Sync(_) => "sync".into(),
            Call::Destroy(_) => "destroy".into(),
            Call::Compare(..) => "compare".into(),
        }
    }
}

/// Executes nothing; remembers every call and keeps buffer contents.
pub(crate) struct RecordingDevice {
    pub(crate) warp_size: u32,
    pub(crate) arch: Architecture,
    pub(crate) peak_gflops: f64,
    pub(crate) calls: Vec<Call>,
    pub(crate) fail_launches: bool,
    buffers: HashMap<u64, Vec<f64>>,
    next_id: u64,
}

impl RecordingDevice {
    pub(crate) fn new(warp_size: u32) -> Self {
        Self {
            warp_size,
            arch: Architecture::Gfx90a,
            peak_gflops: 1000.0,
            calls: Vec::new(),
            fail_launches: false,
            buffers: HashMap::new(),
            next_id: 1,
        }
    }

    pub(crate) fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    fn buffer(&self, id: u64) -> Result<&Vec<f64>> {
        self.buffers
            .get(&id)
            .ok_or_else(|| DlrmError::Accelerator(format!("unknown buffer {id}")))
    }
}

impl DeviceCapabilities for RecordingDevice {
    fn architecture(&self) -> Architecture {
        self.arch
    }

    fn warp_size(&self) -> u32 {
        self.warp_size
    }

    fn shared_memory_capacity(&self) -> u32 {
        65536
    }

    fn peak_gflops_per_sec(&self, _data_type: DataType) -> f64 {
        self.peak_gflops
    }
}

impl Accelerator for RecordingDevice {
    fn alloc(&mut self, data_type: DataType, len: usize) -> Result<DeviceBuffer> {
        let id = self.next_id;
        self.next_id += 1;
        self.buffers.insert(id, vec![0.0; len]);
        self.calls.push(Call::Alloc(id, len));
        Ok(DeviceBuffer::new(id, len, data_type))
    }

    fn free(&mut self, buffer: DeviceBuffer) -> Result<()> {
        self.buffers.remove(&buffer.id());
        self.calls.push(Call::Free(buffer.id()));
        Ok(())
    }

    fn fill_random(
        &mut self,
        buffer: &DeviceBuffer,
        _rows: u32,
        _cols: u32,
        _batch: u32,
        seed: u64,
    ) -> Result<()> {
        let data = self
            .buffers
            .get_mut(&buffer.id())
            .ok_or_else(|| DlrmError::Accelerator("fill of unknown buffer".into()))?;
        for (i, v) in data.iter_mut().enumerate() {
            *v = ((i as u64 + seed) % 5) as f64 - 2.0;
        }
        self.calls.push(Call::Fill(buffer.id(), seed));
        Ok(())
    }

    fn copy_to_host(&mut self, buffer: &DeviceBuffer) -> Result<Vec<f64>> {
        self.buffer(buffer.id()).cloned()
    }

    fn copy_to_device(&mut self, buffer: &DeviceBuffer, data: &[f64]) -> Result<()> {
        let dt = buffer.data_type();
        let slot = self
            .buffers
            .get_mut(&buffer.id())
            .ok_or_else(|| DlrmError::Accelerator("copy to unknown buffer".into()))?;
        *slot = data.iter().map(|&v| dt.quantize(v)).collect();
        Ok(())
    }

    fn launch(
        &mut self,
        kernel: &KernelHandle,
        _config: &LaunchConfig,
        _args: &KernelArgs,
    ) -> Result<()> {
        if self.fail_launches {
            return Err(DlrmError::Accelerator(format!("launch of {} failed", kernel.name)));
        }
        self.calls.push(Call::Launch(kernel.name.clone()));
        Ok(())
    }

    fn record_event(&mut self) -> Result<EventId> {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.calls.push(Call::Record(id));
        Ok(id)
    }

    fn synchronize_event(&mut self, event: EventId) -> Result<()> {
        self.calls.push(Call::Sync(event));
        Ok(())
    }

    fn elapsed_ms(&mut self, _start: EventId, _stop: EventId) -> Result<f32> {
        Ok(2.0)
    }

    fn destroy_event(&mut self, event: EventId) -> Result<()> {
        self.calls.push(Call::Destroy(event));
        Ok(())
    }

    fn compare(
        &mut self,
        actual: &DeviceBuffer,
        expected: &DeviceBuffer,
        _shape: (u32, u32, u32),
        tolerance: f64,
    ) -> Result<Comparison> {
        self.calls.push(Call::Compare(actual.id(), expected.id()));
        let a = self.buffer(actual.id())?;
        let b = self.buffer(expected.id())?;
        Ok(crate::validation::compare_slices(
            a,
            b,
            actual.data_type(),
            tolerance,
        ))
    }
}
