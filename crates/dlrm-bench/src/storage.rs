//! Buffer provisioning for interaction trials.
//!
//! [`DlrmStorage`] is an explicitly owned pool handed to each trial by
//! `&mut`, so two trials can never provision against the same pool at the
//! same time. Resizing for a new trial releases whatever the previous trial
//! allocated.

use crate::config::ProblemConfig;
use crate::device::{Accelerator, DeviceBuffer};
use crate::error::{DlrmError, Result};
use crate::types::DataType;
use tracing::debug;

/// Seed offset applied to the upstream-gradient fill.
const UPSTREAM_SEED_OFFSET: u64 = 1;

// ============================================================================
// Device-resident buffer sets
// ============================================================================

/// Buffers used by a forward trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardBuffers {
    /// `M×K×B` feature vectors.
    pub input: DeviceBuffer,
    /// `B × (M(M-1)/2 + K)` interactions.
    pub output: DeviceBuffer,
    /// `M×M×B` scratch.
    pub acc: DeviceBuffer,
}

/// Buffers used by a backward trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackwardBuffers {
    pub input: DeviceBuffer,
    /// `B × (M(M-1)/2 + K)` upstream gradient.
    pub upstream_grad: DeviceBuffer,
    /// `M×K×B` input gradient.
    pub grad: DeviceBuffer,
    /// `K×B` passthrough gradient.
    pub bottom_mlp_grad: DeviceBuffer,
    /// `M×M×B` triangular reduction output.
    pub acc: DeviceBuffer,
}

impl ForwardBuffers {
    fn all(&self) -> [DeviceBuffer; 3] {
        [self.input, self.output, self.acc]
    }
}

impl BackwardBuffers {
    fn all(&self) -> [DeviceBuffer; 5] {
        [
            self.input,
            self.upstream_grad,
            self.grad,
            self.bottom_mlp_grad,
            self.acc,
        ]
    }
}

/// Host copies of the inputs, captured for reference computation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostInputs {
    pub input: Vec<f64>,
    pub upstream_grad: Vec<f64>,
}

// ============================================================================
// Storage pool
// ============================================================================

/// Per-session buffer pool.
#[derive(Debug, Default)]
pub struct DlrmStorage {
    forward: Option<ForwardBuffers>,
    backward: Option<BackwardBuffers>,
    host: HostInputs,
    scratch: Vec<DeviceBuffer>,
}

impl DlrmStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate forward buffers sized for `config`.
    pub fn resize_forward<A: Accelerator + ?Sized>(
        &mut self,
        device: &mut A,
        config: &ProblemConfig,
    ) -> Result<ForwardBuffers> {
        self.release(device)?;
        let dt = config.data_type();
        let buffers = ForwardBuffers {
            input: device.alloc(dt, config.input_len())?,
            output: device.alloc(dt, config.output_len())?,
            acc: device.alloc(dt, config.acc_len())?,
        };
        debug!(
            input = config.input_len(),
            output = config.output_len(),
            acc = config.acc_len(),
            "provisioned forward storage"
        );
        self.forward = Some(buffers);
        Ok(buffers)
    }

    /// Allocate backward buffers sized for `config`.
    pub fn resize_backward<A: Accelerator + ?Sized>(
        &mut self,
        device: &mut A,
        config: &ProblemConfig,
    ) -> Result<BackwardBuffers> {
        self.release(device)?;
        let dt = config.data_type();
        let buffers = BackwardBuffers {
            input: device.alloc(dt, config.input_len())?,
            upstream_grad: device.alloc(dt, config.output_len())?,
            grad: device.alloc(dt, config.input_len())?,
            bottom_mlp_grad: device.alloc(dt, config.bottom_mlp_grad_len())?,
            acc: device.alloc(dt, config.acc_len())?,
        };
        debug!(
            input = config.input_len(),
            upstream_grad = config.output_len(),
            acc = config.acc_len(),
            "provisioned backward storage"
        );
        self.backward = Some(buffers);
        Ok(buffers)
    }

    /// Seed the forward input.
    pub fn fill_forward<A: Accelerator + ?Sized>(
        &mut self,
        device: &mut A,
        config: &ProblemConfig,
        seed: u64,
    ) -> Result<()> {
        let fwd = self.forward()?;
        device.fill_random(&fwd.input, config.m(), config.k(), config.batch(), seed)
    }

    /// Seed the backward input and upstream gradient.
    pub fn fill_backward<A: Accelerator + ?Sized>(
        &mut self,
        device: &mut A,
        config: &ProblemConfig,
        seed: u64,
    ) -> Result<()> {
        let bwd = self.backward()?;
        let grad_size = config.output_batch_stride() as u32;
        device.fill_random(&bwd.input, config.m(), config.k(), config.batch(), seed)?;
        device.fill_random(
            &bwd.upstream_grad,
            1,
            grad_size,
            config.batch(),
            seed.wrapping_add(UPSTREAM_SEED_OFFSET),
        )
    }

    /// Capture the forward input on the host.
    pub fn copy_device_to_host_fwd_input<A: Accelerator + ?Sized>(
        &mut self,
        device: &mut A,
    ) -> Result<()> {
        let fwd = self.forward()?;
        self.host = HostInputs {
            input: device.copy_to_host(&fwd.input)?,
            upstream_grad: Vec::new(),
        };
        Ok(())
    }

    /// Capture the backward input and upstream gradient on the host.
    pub fn copy_device_to_host_bwd_input<A: Accelerator + ?Sized>(
        &mut self,
        device: &mut A,
    ) -> Result<()> {
        let bwd = self.backward()?;
        self.host = HostInputs {
            input: device.copy_to_host(&bwd.input)?,
            upstream_grad: device.copy_to_host(&bwd.upstream_grad)?,
        };
        Ok(())
    }

    /// Upload host data into a fresh device buffer owned by this pool.
    pub fn upload<A: Accelerator + ?Sized>(
        &mut self,
        device: &mut A,
        data_type: DataType,
        data: &[f64],
    ) -> Result<DeviceBuffer> {
        let buffer = device.alloc(data_type, data.len())?;
        self.scratch.push(buffer);
        device.copy_to_device(&buffer, data)?;
        Ok(buffer)
    }

    pub fn forward(&self) -> Result<ForwardBuffers> {
        self.forward.ok_or(DlrmError::MissingBuffer("forward"))
    }

    pub fn backward(&self) -> Result<BackwardBuffers> {
        self.backward.ok_or(DlrmError::MissingBuffer("backward"))
    }

    pub fn host(&self) -> &HostInputs {
        &self.host
    }

    /// Free every buffer this pool owns.
    pub fn release<A: Accelerator + ?Sized>(&mut self, device: &mut A) -> Result<()> {
        if let Some(fwd) = self.forward.take() {
            for buffer in fwd.all() {
                device.free(buffer)?;
            }
        }
        if let Some(bwd) = self.backward.take() {
            for buffer in bwd.all() {
                device.free(buffer)?;
            }
        }
        for buffer in self.scratch.drain(..) {
            device.free(buffer)?;
        }
        self.host = HostInputs::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProblemParams;
    use crate::mock::{Call, RecordingDevice};
    use crate::types::Direction;

    fn config(direction: Direction) -> ProblemConfig {
        ProblemConfig::new(&ProblemParams {
            tile_size: 16,
            data_type: DataType::F32,
            thread_block: (64, 1),
            problem_size: (32, 16, 2),
            direction,
        })
        .unwrap()
    }

    #[test]
    fn test_forward_sizes() {
        let mut device = RecordingDevice::new(64);
        let mut storage = DlrmStorage::new();
        let bufs = storage.resize_forward(&mut device, &config(Direction::Forward)).unwrap();
        assert_eq!(bufs.input.len(), 32 * 16 * 2);
        assert_eq!(bufs.output.len(), (32 * 31 / 2 + 16) * 2);
        assert_eq!(bufs.acc.len(), 32 * 32 * 2);
        assert_eq!(device.live_buffers(), 3);
        assert!(storage.backward().is_err());
    }

    #[test]
    fn test_resize_releases_previous_trial() {
        let mut device = RecordingDevice::new(64);
        let mut storage = DlrmStorage::new();
        storage.resize_forward(&mut device, &config(Direction::Forward)).unwrap();
        let bufs = storage.resize_backward(&mut device, &config(Direction::Backward)).unwrap();
        assert_eq!(device.live_buffers(), 5);
        assert_eq!(bufs.bottom_mlp_grad.len(), 16 * 2);
        assert!(matches!(storage.forward(), Err(DlrmError::MissingBuffer("forward"))));

        storage.upload(&mut device, DataType::F32, &[1.0, 2.0]).unwrap();
        assert_eq!(device.live_buffers(), 6);
        storage.release(&mut device).unwrap();
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_backward_fill_seeds() {
        let mut device = RecordingDevice::new(64);
        let mut storage = DlrmStorage::new();
        let cfg = config(Direction::Backward);
        let bufs = storage.resize_backward(&mut device, &cfg).unwrap();
        device.calls.clear();
        storage.fill_backward(&mut device, &cfg, 7).unwrap();
        assert_eq!(
            device.calls,
            vec![Call::Fill(bufs.input.id(), 7), Call::Fill(bufs.upstream_grad.id(), 8)]
        );

        storage.copy_device_to_host_bwd_input(&mut device).unwrap();
        assert_eq!(storage.host().input.len(), cfg.input_len());
        assert_eq!(storage.host().upstream_grad.len(), cfg.output_len());
    }
}
