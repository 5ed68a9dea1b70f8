//! Simulated accelerator.
//!
//! [`SimDevice`] implements the harness traits on the host. Time is a
//! simulated clock advanced by every executed launch, so elapsed times are
//! deterministic. Under [`StreamOrdering::Unordered`] launches are queued
//! and run newest-first at the next synchronization point; an event
//! recorded behind queued work completes only when that work has run.

use crate::error::SimError;
use crate::kernels;
use crate::memory::SimMemory;
use crate::profile::{SimProfile, StreamOrdering};
use dlrm_bench::validation::compare_slices;
use dlrm_bench::{
    Accelerator, Architecture, Comparison, DataType, DeviceBuffer, DeviceCapabilities, EventId,
    KernelArgs, KernelHandle, LaunchConfig, Result,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tracing::{debug, trace};

struct QueuedLaunch {
    kernel: KernelHandle,
    config: LaunchConfig,
    args: KernelArgs,
}

/// Host-executed accelerator.
pub struct SimDevice {
    profile: SimProfile,
    memory: SimMemory,
    queue: Vec<QueuedLaunch>,
    /// Completion time of each live event; `None` while work ahead of it
    /// is still queued.
    events: HashMap<u64, Option<f64>>,
    next_event: u64,
    clock_ms: f64,
    launches_executed: u64,
    pending_fault: Option<String>,
}

impl SimDevice {
    pub fn new(profile: SimProfile) -> Self {
        debug!(
            name = %profile.name,
            arch = %profile.architecture,
            warp_size = profile.warp_size,
            ordering = ?profile.ordering,
            "created simulated device"
        );
        Self {
            profile,
            memory: SimMemory::new(),
            queue: Vec::new(),
            events: HashMap::new(),
            next_event: 0,
            clock_ms: 0.0,
            launches_executed: 0,
            pending_fault: None,
        }
    }

    /// Device for a GCN arch string, if a preset exists.
    pub fn from_gcn_name(gcn_name: &str) -> Option<Self> {
        SimProfile::for_gcn_name(gcn_name).map(Self::new)
    }

    pub fn profile(&self) -> &SimProfile {
        &self.profile
    }

    pub fn set_ordering(&mut self, ordering: StreamOrdering) {
        self.profile.ordering = ordering;
    }

    /// Make the next launch fail once.
    pub fn inject_launch_fault(&mut self, message: impl Into<String>) {
        self.pending_fault = Some(message.into());
    }

    pub fn launches_executed(&self) -> u64 {
        self.launches_executed
    }

    pub fn queued_launches(&self) -> usize {
        self.queue.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.memory.live_buffers()
    }

    pub fn clock_ms(&self) -> f64 {
        self.clock_ms
    }

    fn run_launch(&mut self, launch: &QueuedLaunch) -> std::result::Result<(), SimError> {
        kernels::execute(&launch.kernel, &launch.config, &launch.args, &mut self.memory)?;
        let gflop = kernels::launch_gflop(&launch.kernel, &launch.args);
        self.clock_ms += self.profile.launch_cost_ms(launch.kernel.data_type, gflop);
        self.launches_executed += 1;
        trace!(kernel = %launch.kernel.name, clock_ms = self.clock_ms, "executed launch");
        Ok(())
    }

    /// Drain the queue, then complete every event recorded behind it.
    fn flush(&mut self) -> std::result::Result<(), SimError> {
        if self.queue.is_empty() {
            return Ok(());
        }
        let mut queued = std::mem::take(&mut self.queue);
        if self.profile.ordering == StreamOrdering::Unordered {
            queued.reverse();
        }
        debug!(launches = queued.len(), "flushing launch queue");
        for launch in &queued {
            self.run_launch(launch)?;
        }
        let now = self.clock_ms;
        for stamp in self.events.values_mut().filter(|s| s.is_none()) {
            *stamp = Some(now);
        }
        Ok(())
    }

    fn event_stamp(&self, event: EventId) -> std::result::Result<Option<f64>, SimError> {
        self.events
            .get(&event.0)
            .copied()
            .ok_or(SimError::UnknownEvent(event.0))
    }
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new(SimProfile::default())
    }
}

impl DeviceCapabilities for SimDevice {
    fn architecture(&self) -> Architecture {
        self.profile.architecture
    }

    fn warp_size(&self) -> u32 {
        self.profile.warp_size
    }

    fn shared_memory_capacity(&self) -> u32 {
        self.profile.shared_memory_bytes
    }

    fn peak_gflops_per_sec(&self, data_type: DataType) -> f64 {
        self.profile.peak_gflops_per_sec(data_type)
    }
}

impl Accelerator for SimDevice {
    fn alloc(&mut self, data_type: DataType, len: usize) -> Result<DeviceBuffer> {
        Ok(self.memory.alloc(data_type, len))
    }

    fn free(&mut self, buffer: DeviceBuffer) -> Result<()> {
        self.flush()?;
        Ok(self.memory.free(buffer.id())?)
    }

    fn fill_random(
        &mut self,
        buffer: &DeviceBuffer,
        rows: u32,
        cols: u32,
        batch: u32,
        seed: u64,
    ) -> Result<()> {
        self.flush()?;
        let count = rows as usize * cols as usize * batch as usize;
        let len = self.memory.read(buffer.id())?.len();
        if count != len {
            return Err(SimError::DimensionMismatch(format!(
                "fill of {rows}x{cols}x{batch} into {len} elements"
            ))
            .into());
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let values: Vec<f64> = match self.memory.data_type(buffer.id())? {
            DataType::I8 => (0..count).map(|_| rng.gen_range(-2i32..=2) as f64).collect(),
            _ => (0..count).map(|_| rng.gen_range(-1.0..1.0)).collect(),
        };
        Ok(self.memory.write(buffer.id(), &values)?)
    }

    fn copy_to_host(&mut self, buffer: &DeviceBuffer) -> Result<Vec<f64>> {
        self.flush()?;
        Ok(self.memory.read(buffer.id())?.to_vec())
    }

    fn copy_to_device(&mut self, buffer: &DeviceBuffer, data: &[f64]) -> Result<()> {
        self.flush()?;
        Ok(self.memory.write(buffer.id(), data)?)
    }

    fn launch(
        &mut self,
        kernel: &KernelHandle,
        config: &LaunchConfig,
        args: &KernelArgs,
    ) -> Result<()> {
        if let Some(message) = self.pending_fault.take() {
            return Err(SimError::LaunchFault(format!("{}: {message}", kernel.name)).into());
        }
        kernels::validate_launch(&self.profile, kernel, config, args)?;

        let launch = QueuedLaunch {
            kernel: kernel.clone(),
            config: *config,
            args: *args,
        };
        match self.profile.ordering {
            StreamOrdering::InOrder => self.run_launch(&launch)?,
            StreamOrdering::Unordered => self.queue.push(launch),
        }
        Ok(())
    }

    fn record_event(&mut self) -> Result<EventId> {
        self.next_event += 1;
        let id = self.next_event;
        let stamp = self.queue.is_empty().then_some(self.clock_ms);
        self.events.insert(id, stamp);
        Ok(EventId(id))
    }

    fn synchronize_event(&mut self, event: EventId) -> Result<()> {
        self.event_stamp(event)?;
        self.flush()?;
        Ok(())
    }

    fn elapsed_ms(&mut self, start: EventId, stop: EventId) -> Result<f32> {
        match (self.event_stamp(start)?, self.event_stamp(stop)?) {
            (Some(t0), Some(t1)) => Ok((t1 - t0) as f32),
            (None, _) => Err(SimError::EventNotComplete(start.0).into()),
            (_, None) => Err(SimError::EventNotComplete(stop.0).into()),
        }
    }

    fn destroy_event(&mut self, event: EventId) -> Result<()> {
        self.events
            .remove(&event.0)
            .map(|_| ())
            .ok_or_else(|| SimError::UnknownEvent(event.0).into())
    }

    fn compare(
        &mut self,
        actual: &DeviceBuffer,
        expected: &DeviceBuffer,
        shape: (u32, u32, u32),
        tolerance: f64,
    ) -> Result<Comparison> {
        self.flush()?;
        let (rows, cols, batch) = shape;
        let count = rows as usize * cols as usize * batch as usize;
        let a = self.memory.read_range(actual.id(), 0, count)?;
        let e = self.memory.read_range(expected.id(), 0, count)?;
        Ok(compare_slices(a, e, actual.data_type(), tolerance))
    }
}
