//! Launch geometry and the ordered kernel sequence for one repetition.
//!
//! A [`DispatchPlan`] is built once per trial and executed `repeats` times
//! inside a single timed window:
//!
//! ```text
//! Forward:   [fwd]
//! Backward:  [tril] → record(e) → wait(e) → [bwd]
//! ```
//!
//! The backward kernel reads the accumulator the reduction writes, and
//! launches on a stream carry no ordering guarantee unless joined, so the
//! event wait between the two is required.

use crate::config::{ceil_div, ProblemConfig};
use crate::device::{Accelerator, BatchShape, Dim3, KernelArgs, KernelHandle, LaunchConfig};
use crate::error::{DlrmError, Result};
use crate::gate::KERNEL_LDS_BYTES;
use crate::registry::KernelSet;
use crate::storage::DlrmStorage;
use crate::types::Direction;
use tracing::debug;

// ============================================================================
// Geometry
// ============================================================================

/// `(blockX, 1, 1)`.
pub fn block_dim(config: &ProblemConfig) -> Dim3 {
    Dim3::new(config.block_x(), 1, 1)
}

/// Grid of the interaction kernels.
///
/// `x` tiles the padded rows at wave granularity, `y` tiles `M` forwards
/// and `K` backwards, `z` is the batch.
pub fn grid_dim(config: &ProblemConfig, warp_size: u32) -> Dim3 {
    let tile = config.tile_size();
    let rows_per_block = (tile * config.block_x() / warp_size.max(1)).max(1);
    let y = match config.direction() {
        Direction::Forward => ceil_div(config.m(), tile),
        Direction::Backward => ceil_div(config.k(), tile),
    };
    Dim3::new(ceil_div(config.m_padded(), rows_per_block), y, config.batch())
}

/// Grid of the triangular reduction: one thread per accumulator element.
pub fn tril_grid_dim(config: &ProblemConfig) -> Dim3 {
    Dim3::new(
        ceil_div(config.m() * config.m(), config.block_x()),
        1,
        config.batch(),
    )
}

// ============================================================================
// Plan
// ============================================================================

/// One kernel invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub kernel: KernelHandle,
    pub config: LaunchConfig,
    pub args: KernelArgs,
}

impl Launch {
    fn submit<A: Accelerator + ?Sized>(&self, device: &mut A) -> Result<()> {
        device.launch(&self.kernel, &self.config, &self.args)
    }
}

/// Launch sequence for one repetition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchPlan {
    /// Single interaction launch.
    Forward(Launch),
    /// Reduction, event barrier, then the main backward launch.
    Backward { reduction: Launch, main: Launch },
}

impl DispatchPlan {
    /// Build the fast-path plan for an aligned problem.
    ///
    /// Unaligned problems would need a padded path that does not exist;
    /// they are rejected rather than guessed at.
    pub fn build(
        config: &ProblemConfig,
        kernels: &KernelSet,
        storage: &DlrmStorage,
        warp_size: u32,
    ) -> Result<Self> {
        if !config.is_aligned() {
            return Err(DlrmError::PaddedPathUnimplemented {
                m: config.m(),
                k: config.k(),
                m_padded: config.m_padded(),
                k_padded: config.k_padded(),
            });
        }

        let shape = BatchShape {
            m: config.m(),
            k: config.k(),
            b: config.batch(),
        };
        let input_batch_offset = offset(config.input_batch_stride())?;
        let output_batch_offset = offset(config.output_batch_stride())?;
        let acc_batch_offset = offset(config.acc_batch_stride())?;

        let main_config = LaunchConfig {
            grid_dim: grid_dim(config, warp_size),
            block_dim: block_dim(config),
            shared_mem_bytes: KERNEL_LDS_BYTES,
        };

        let plan = match config.direction() {
            Direction::Forward => {
                let bufs = storage.forward()?;
                DispatchPlan::Forward(Launch {
                    kernel: kernels.forward.clone(),
                    config: main_config,
                    args: KernelArgs::Forward {
                        input: bufs.input,
                        output: bufs.output,
                        acc: bufs.acc,
                        shape,
                        input_batch_offset,
                        output_batch_offset,
                        acc_batch_offset,
                    },
                })
            }
            Direction::Backward => {
                let bufs = storage.backward()?;
                let reduction = Launch {
                    kernel: kernels.tril_reduction.clone(),
                    config: LaunchConfig {
                        grid_dim: tril_grid_dim(config),
                        block_dim: block_dim(config),
                        shared_mem_bytes: 0,
                    },
                    args: KernelArgs::TrilReduction {
                        upstream_grad: bufs.upstream_grad,
                        acc: bufs.acc,
                        shape,
                        upstream_batch_offset: output_batch_offset,
                        acc_batch_offset,
                    },
                };
                let main = Launch {
                    kernel: kernels.backward.clone(),
                    config: main_config,
                    args: KernelArgs::Backward {
                        input: bufs.input,
                        upstream_grad: bufs.upstream_grad,
                        grad: bufs.grad,
                        bottom_mlp_grad: bufs.bottom_mlp_grad,
                        acc: bufs.acc,
                        shape,
                        input_batch_offset,
                        upstream_batch_offset: output_batch_offset,
                        acc_batch_offset,
                    },
                };
                DispatchPlan::Backward { reduction, main }
            }
        };

        debug!(
            grid = %main_config.grid_dim,
            block = %main_config.block_dim,
            direction = %config.direction(),
            "built dispatch plan"
        );
        Ok(plan)
    }

    /// Number of kernel launches per repetition.
    pub fn launches_per_repeat(&self) -> usize {
        match self {
            DispatchPlan::Forward(_) => 1,
            DispatchPlan::Backward { .. } => 2,
        }
    }

    /// Submit one repetition.
    pub fn execute_once<A: Accelerator + ?Sized>(&self, device: &mut A) -> Result<()> {
        match self {
            DispatchPlan::Forward(launch) => launch.submit(device),
            DispatchPlan::Backward { reduction, main } => {
                reduction.submit(device)?;
                let sync = device.record_event()?;
                device.synchronize_event(sync)?;
                device.destroy_event(sync)?;
                main.submit(device)
            }
        }
    }

    /// Run `repeats` repetitions between a start and stop event and return
    /// the elapsed milliseconds once the stop event has completed.
    pub fn run_timed<A: Accelerator + ?Sized>(&self, device: &mut A, repeats: u32) -> Result<f64> {
        let start = device.record_event()?;
        for _ in 0..repeats {
            self.execute_once(device)?;
        }
        let stop = device.record_event()?;
        device.synchronize_event(stop)?;

        let elapsed = device.elapsed_ms(start, stop)?;
        device.destroy_event(start)?;
        device.destroy_event(stop)?;
        Ok(elapsed as f64)
    }
}

fn offset(stride: usize) -> Result<u32> {
    u32::try_from(stride)
        .map_err(|_| DlrmError::DimensionMismatch(format!("batch stride {stride} overflows u32")))
}
