//! Benchmark and correctness harness for tiled DLRM dot-interaction kernels.
//!
//! The harness drives an accelerator through the traits in [`device`]; it
//! never talks to a vendor runtime directly. Each trial checks the
//! configuration against the device, provisions buffers, runs a timed
//! launch sequence, derives throughput, optionally validates against a
//! host reference and prints one report row.
//!
//! # Quick Start
//!
//! ```ignore
//! use dlrm_bench::{run_trial, DataType, Direction, DlrmStorage, HarnessConfig,
//!                  ProblemParams, ReportSession};
//!
//! let mut storage = DlrmStorage::new();
//! let mut session = ReportSession::stdout(true);
//! let params = ProblemParams {
//!     tile_size: 16,
//!     data_type: DataType::F16,
//!     thread_block: (64, 1),
//!     problem_size: (32, 32, 4),
//!     direction: Direction::Forward,
//! };
//!
//! run_trial(&mut device, &mut storage, &mut session, &params, &HarnessConfig::validation())?;
//! session.assert_all_passed();
//! ```
//!
//! # Launch Sequence
//!
//! Forward trials launch one interaction kernel per repetition. Backward
//! trials launch a triangular reduction, wait on an event, then launch the
//! backward kernel; see [`dispatch`].

pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod harness;
pub mod metrics;
pub mod reference;
pub mod registry;
pub mod report;
pub mod storage;
pub mod types;
pub mod validation;

#[cfg(test)]
mod mock;

pub use config::{HarnessConfig, ProblemConfig, ProblemParams};
pub use device::{
    Accelerator, BatchShape, Comparison, DeviceBuffer, DeviceCapabilities, Dim3, EventId,
    KernelArgs, KernelHandle, KernelKind, LaunchConfig,
};
pub use dispatch::DispatchPlan;
pub use error::{DlrmError, Result};
pub use gate::GateReport;
pub use harness::{run_trial, DlrmTrial, TrialState};
pub use metrics::Metrics;
pub use registry::{KernelRegistry, KernelSet, DEFAULT_REGISTRY};
pub use report::{ReportSession, TrialOutcome, TrialRecord};
pub use storage::DlrmStorage;
pub use types::{Architecture, DataType, Direction};
pub use validation::ValidationOutcome;
