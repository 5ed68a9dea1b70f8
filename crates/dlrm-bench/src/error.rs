//! Error types for the DLRM harness.

use crate::types::DataType;
use thiserror::Error;

/// Errors that can occur while provisioning, dispatching or reporting a trial.
///
/// Gate rejections and validation mismatches are not errors: they are
/// recorded on the trial state and reported as `SKIPPED` / `FAILED`.
#[derive(Debug, Error)]
pub enum DlrmError {
    /// Accelerator runtime failure (launch, synchronization, copy).
    #[error("Accelerator error: {0}")]
    Accelerator(String),

    /// Problem parameters that cannot describe any trial.
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),

    /// No kernel set registered for the requested specialization.
    #[error("No kernel registered for tile size {tile_size} and data type {data_type}")]
    KernelNotFound { tile_size: u32, data_type: DataType },

    /// Dimensions not already a multiple of the tile size.
    #[error(
        "Padded dispatch is not implemented: M={m} (padded {m_padded}), K={k} (padded {k_padded})"
    )]
    PaddedPathUnimplemented {
        m: u32,
        k: u32,
        m_padded: u32,
        k_padded: u32,
    },

    /// A buffer the current direction did not provision.
    #[error("Buffer not provisioned: {0}")]
    MissingBuffer(&'static str),

    /// Dimension mismatch.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Harness configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Report sink failure.
    #[error("Report sink error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, DlrmError>;
