//! Host-executed accelerator for the dlrm-bench harness.
//!
//! [`SimDevice`] implements [`dlrm_bench::Accelerator`] without hardware:
//! memory lives on the host, kernels run the reference math per batch, and
//! time is a simulated clock driven by a [`SimProfile`].
//!
//! # Quick Start
//!
//! ```ignore
//! use dlrm_bench::{run_trial, DataType, Direction, DlrmStorage, HarnessConfig,
//!                  ProblemParams, ReportSession};
//! use dlrm_bench_sim::{SimDevice, SimProfile};
//!
//! let mut device = SimDevice::new(SimProfile::gfx90a());
//! let mut storage = DlrmStorage::new();
//! let mut session = ReportSession::stdout(true);
//!
//! let params = ProblemParams {
//!     tile_size: 16,
//!     data_type: DataType::F16,
//!     thread_block: (64, 1),
//!     problem_size: (32, 32, 4),
//!     direction: Direction::Backward,
//! };
//! run_trial(&mut device, &mut storage, &mut session, &params, &HarnessConfig::validation())?;
//! ```
//!
//! # Stream Ordering
//!
//! With [`StreamOrdering::Unordered`] launches only run at synchronization
//! points (event waits, copies, fills, comparisons), newest first. A
//! dependent launch that is not separated by an event wait then reads
//! stale data, which makes missing barriers visible in tests.

mod device;
mod error;
mod kernels;
mod memory;
mod profile;

pub use device::SimDevice;
pub use error::{Result, SimError};
pub use memory::SimMemory;
pub use profile::{SimProfile, StreamOrdering, MAX_THREADS_PER_BLOCK};
