//! Host execution of the interaction kernels.
//!
//! Each launch processes the batches its grid covers (`blockIdx.z`), one
//! batch element at a time, with the same per-batch math as the host
//! reference. Results are written back through [`SimMemory`], so they are
//! rounded to the element type exactly like device stores.

use crate::error::{Result, SimError};
use crate::memory::SimMemory;
use crate::profile::{SimProfile, MAX_THREADS_PER_BLOCK};
use dlrm_bench::reference::{backward_batch, forward_batch, tril_batch};
use dlrm_bench::{BatchShape, DeviceBuffer, KernelArgs, KernelHandle, KernelKind, LaunchConfig};

fn invalid(kernel: &KernelHandle, reason: impl Into<String>) -> SimError {
    SimError::InvalidLaunch {
        kernel: kernel.name.clone(),
        reason: reason.into(),
    }
}

fn shape_of(args: &KernelArgs) -> BatchShape {
    match args {
        KernelArgs::Forward { shape, .. }
        | KernelArgs::TrilReduction { shape, .. }
        | KernelArgs::Backward { shape, .. } => *shape,
    }
}

fn buffers_of(args: &KernelArgs) -> Vec<DeviceBuffer> {
    match *args {
        KernelArgs::Forward {
            input, output, acc, ..
        } => vec![input, output, acc],
        KernelArgs::TrilReduction {
            upstream_grad, acc, ..
        } => vec![upstream_grad, acc],
        KernelArgs::Backward {
            input,
            upstream_grad,
            grad,
            bottom_mlp_grad,
            acc,
            ..
        } => vec![input, upstream_grad, grad, bottom_mlp_grad, acc],
    }
}

/// Reject launches a real device would refuse.
pub fn validate_launch(
    profile: &SimProfile,
    kernel: &KernelHandle,
    config: &LaunchConfig,
    args: &KernelArgs,
) -> Result<()> {
    let kind_matches = matches!(
        (kernel.kind, args),
        (KernelKind::Forward, KernelArgs::Forward { .. })
            | (KernelKind::TrilReduction, KernelArgs::TrilReduction { .. })
            | (KernelKind::Backward, KernelArgs::Backward { .. })
    );
    if !kind_matches {
        return Err(invalid(kernel, "arguments do not match kernel kind"));
    }
    if config.grid_dim.volume() == 0 || config.block_dim.volume() == 0 {
        return Err(invalid(
            kernel,
            format!("empty launch grid {} block {}", config.grid_dim, config.block_dim),
        ));
    }
    if config.block_dim.volume() > MAX_THREADS_PER_BLOCK {
        return Err(invalid(
            kernel,
            format!("block {} exceeds {MAX_THREADS_PER_BLOCK} threads", config.block_dim),
        ));
    }
    if config.shared_mem_bytes > profile.shared_memory_bytes {
        return Err(invalid(
            kernel,
            format!(
                "{} LDS bytes requested, {} available",
                config.shared_mem_bytes, profile.shared_memory_bytes
            ),
        ));
    }
    let shape = shape_of(args);
    if shape.m == 0 || shape.k == 0 {
        return Err(invalid(kernel, "empty interaction shape"));
    }
    if let Some(buf) = buffers_of(args)
        .into_iter()
        .find(|b| b.data_type() != kernel.data_type)
    {
        return Err(invalid(
            kernel,
            format!(
                "buffer {} holds {}, kernel expects {}",
                buf.id(),
                buf.data_type(),
                kernel.data_type
            ),
        ));
    }
    Ok(())
}

/// Work of one launch in GFLOP, used to advance the simulated clock.
pub fn launch_gflop(kernel: &KernelHandle, args: &KernelArgs) -> f64 {
    let s = shape_of(args);
    let (m, k, b) = (s.m as f64, s.k as f64, s.b as f64);
    match kernel.kind {
        KernelKind::Forward | KernelKind::Backward => 2.0 * m * m * k * b * 1.0e-9,
        KernelKind::TrilReduction => m * m * b * 1.0e-9,
    }
}

/// Run one launch against device memory.
pub fn execute(
    kernel: &KernelHandle,
    config: &LaunchConfig,
    args: &KernelArgs,
    memory: &mut SimMemory,
) -> Result<()> {
    let shape = shape_of(args);
    let (m, k) = (shape.m as usize, shape.k as usize);
    let out_stride = m * m.saturating_sub(1) / 2 + k;
    let batches = shape.b.min(config.grid_dim.z) as usize;
    let dt = kernel.data_type;

    match *args {
        KernelArgs::Forward {
            input,
            output,
            acc,
            input_batch_offset,
            output_batch_offset,
            acc_batch_offset,
            ..
        } => {
            let mut out = vec![0.0; out_stride];
            let mut scratch = vec![0.0; m * m];
            for t in 0..batches {
                let x = memory
                    .read_range(input.id(), t * input_batch_offset as usize, m * k)?
                    .to_vec();
                forward_batch(dt, &x, m, k, &mut out, &mut scratch);
                memory.write_range(output.id(), t * output_batch_offset as usize, &out)?;
                memory.write_range(acc.id(), t * acc_batch_offset as usize, &scratch)?;
            }
        }
        KernelArgs::TrilReduction {
            upstream_grad,
            acc,
            upstream_batch_offset,
            acc_batch_offset,
            ..
        } => {
            let mut reduced = vec![0.0; m * m];
            for t in 0..batches {
                let up = memory
                    .read_range(
                        upstream_grad.id(),
                        t * upstream_batch_offset as usize,
                        out_stride,
                    )?
                    .to_vec();
                tril_batch(&up, m, k, &mut reduced);
                memory.write_range(acc.id(), t * acc_batch_offset as usize, &reduced)?;
            }
        }
        KernelArgs::Backward {
            input,
            upstream_grad,
            grad,
            bottom_mlp_grad,
            acc,
            input_batch_offset,
            upstream_batch_offset,
            acc_batch_offset,
            ..
        } => {
            let mut g = vec![0.0; m * k];
            let mut bottom = vec![0.0; k];
            for t in 0..batches {
                let x = memory
                    .read_range(input.id(), t * input_batch_offset as usize, m * k)?
                    .to_vec();
                let up = memory
                    .read_range(
                        upstream_grad.id(),
                        t * upstream_batch_offset as usize,
                        out_stride,
                    )?
                    .to_vec();
                let a = memory
                    .read_range(acc.id(), t * acc_batch_offset as usize, m * m)?
                    .to_vec();
                backward_batch(dt, &x, &up, &a, m, k, &mut g, &mut bottom);
                memory.write_range(grad.id(), t * input_batch_offset as usize, &g)?;
                memory.write_range(bottom_mlp_grad.id(), t * k, &bottom)?;
            }
        }
    }
    Ok(())
}
