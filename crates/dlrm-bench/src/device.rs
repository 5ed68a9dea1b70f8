//! Accelerator-facing interfaces consumed by the harness.
//!
//! The harness never touches device memory or kernel code directly. A
//! backend implements [`DeviceCapabilities`] and [`Accelerator`]; buffers,
//! events and kernels cross the boundary as opaque handles.
//!
//! Launches submitted through [`Accelerator::launch`] are asynchronous with
//! respect to the caller. Work is only guaranteed complete once an event
//! recorded after it has been waited on with
//! [`Accelerator::synchronize_event`], or after a blocking copy/compare.

use crate::error::Result;
use crate::types::{Architecture, DataType};
use std::fmt;

/// Grid or block extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Total number of blocks or threads.
    pub fn volume(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

impl fmt::Display for Dim3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Launch geometry for one kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid_dim: Dim3,
    pub block_dim: Dim3,
    pub shared_mem_bytes: u32,
}

/// Handle to a device-resident buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceBuffer {
    id: u64,
    len: usize,
    data_type: DataType,
}

impl DeviceBuffer {
    /// Backends mint handles for memory they own.
    pub fn new(id: u64, len: usize, data_type: DataType) -> Self {
        Self { id, len, data_type }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Element count.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

/// Handle to a recorded stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub u64);

/// Role of a kernel within the interaction layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelKind {
    Forward,
    Backward,
    TrilReduction,
}

/// Opaque launchable kernel, specialized for one tile size and element type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelHandle {
    pub name: String,
    pub kind: KernelKind,
    pub tile_size: u32,
    pub data_type: DataType,
}

/// `(M, K, B)` scalars passed to every interaction kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchShape {
    pub m: u32,
    pub k: u32,
    pub b: u32,
}

/// Argument pack for one kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelArgs {
    Forward {
        input: DeviceBuffer,
        output: DeviceBuffer,
        acc: DeviceBuffer,
        shape: BatchShape,
        input_batch_offset: u32,
        output_batch_offset: u32,
        acc_batch_offset: u32,
    },
    TrilReduction {
        upstream_grad: DeviceBuffer,
        acc: DeviceBuffer,
        shape: BatchShape,
        upstream_batch_offset: u32,
        acc_batch_offset: u32,
    },
    Backward {
        input: DeviceBuffer,
        upstream_grad: DeviceBuffer,
        grad: DeviceBuffer,
        bottom_mlp_grad: DeviceBuffer,
        acc: DeviceBuffer,
        shape: BatchShape,
        input_batch_offset: u32,
        upstream_batch_offset: u32,
        acc_batch_offset: u32,
    },
}

/// Outcome of an element-wise output comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub passed: bool,
    pub max_relative_error: f64,
}

/// Static properties of the accelerator.
pub trait DeviceCapabilities {
    fn architecture(&self) -> Architecture;

    /// Lanes per wave.
    fn warp_size(&self) -> u32;

    /// Shared (LDS) memory available to one block, in bytes.
    fn shared_memory_capacity(&self) -> u32;

    /// Theoretical peak throughput for the element type, in GFLOP/s.
    fn peak_gflops_per_sec(&self, data_type: DataType) -> f64;
}

/// Runtime operations the harness issues against the accelerator.
///
/// Every method returning `Err` signals a runtime failure that the harness
/// does not retry.
pub trait Accelerator: DeviceCapabilities {
    /// Allocate a zero-initialized buffer of `len` elements.
    fn alloc(&mut self, data_type: DataType, len: usize) -> Result<DeviceBuffer>;

    fn free(&mut self, buffer: DeviceBuffer) -> Result<()>;

    /// Fill a `rows × cols × batch` buffer with seeded pseudo-random values.
    fn fill_random(
        &mut self,
        buffer: &DeviceBuffer,
        rows: u32,
        cols: u32,
        batch: u32,
        seed: u64,
    ) -> Result<()>;

    /// Blocking device-to-host copy.
    fn copy_to_host(&mut self, buffer: &DeviceBuffer) -> Result<Vec<f64>>;

    /// Blocking host-to-device copy; values are rounded to the buffer type.
    fn copy_to_device(&mut self, buffer: &DeviceBuffer, data: &[f64]) -> Result<()>;

    /// Enqueue a kernel launch.
    fn launch(
        &mut self,
        kernel: &KernelHandle,
        config: &LaunchConfig,
        args: &KernelArgs,
    ) -> Result<()>;

    /// Record an event after all previously submitted work.
    fn record_event(&mut self) -> Result<EventId>;

    /// Block until the event has been reached.
    fn synchronize_event(&mut self, event: EventId) -> Result<()>;

    /// Milliseconds between two completed events.
    fn elapsed_ms(&mut self, start: EventId, stop: EventId) -> Result<f32>;

    fn destroy_event(&mut self, event: EventId) -> Result<()>;

    /// Compare two `rows × cols × batch` buffers on the device.
    fn compare(
        &mut self,
        actual: &DeviceBuffer,
        expected: &DeviceBuffer,
        shape: (u32, u32, u32),
        tolerance: f64,
    ) -> Result<Comparison>;
}
