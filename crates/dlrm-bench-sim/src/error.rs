//! Error types for simulated device operations.

use dlrm_bench::DlrmError;
use thiserror::Error;

/// Errors that can occur on the simulated device.
#[derive(Debug, Error)]
pub enum SimError {
    /// Buffer id was never allocated or has been freed.
    #[error("Unknown buffer: {0}")]
    UnknownBuffer(u64),

    /// Event id was never recorded or has been destroyed.
    #[error("Unknown event: {0}")]
    UnknownEvent(u64),

    /// Timing was queried for an event that has not completed.
    #[error("Event {0} has not completed")]
    EventNotComplete(u64),

    /// Launch configuration rejected before execution.
    #[error("Invalid launch of {kernel}: {reason}")]
    InvalidLaunch { kernel: String, reason: String },

    /// Injected launch failure.
    #[error("Launch fault: {0}")]
    LaunchFault(String),

    /// Dimension mismatch.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Device profile could not be parsed.
    #[error("Profile error: {0}")]
    Profile(#[from] serde_json::Error),
}

impl From<SimError> for DlrmError {
    fn from(err: SimError) -> Self {
        DlrmError::Accelerator(err.to_string())
    }
}

/// Result type for simulated device operations.
pub type Result<T> = std::result::Result<T, SimError>;
