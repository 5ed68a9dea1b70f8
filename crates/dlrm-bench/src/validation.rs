//! Output validation against the host reference.
//!
//! Reference results are uploaded next to the device outputs and compared
//! by the accelerator's own comparison routine. Each comparison yields a
//! pass flag and the largest relative error; a trial passes only if every
//! sub-comparison passes, and reports the maximum error over all of them.

use crate::config::ProblemConfig;
use crate::device::{Accelerator, Comparison, DeviceBuffer};
use crate::error::Result;
use crate::reference;
use crate::storage::DlrmStorage;
use crate::types::DataType;
use tracing::{debug, warn};

/// Relative difference used for every element comparison.
///
/// `|a − b| / (|a| + |b| + 1)`; non-finite disagreements are infinite.
pub fn relative_error(actual: f64, expected: f64) -> f64 {
    if actual == expected {
        return 0.0;
    }
    if !actual.is_finite() || !expected.is_finite() {
        return f64::INFINITY;
    }
    (actual - expected).abs() / (actual.abs() + expected.abs() + 1.0)
}

/// Element-wise comparison of two host slices.
///
/// Passes when the maximum relative error does not exceed
/// `tolerance · ε(data_type)`. Slices of different length never pass.
pub fn compare_slices(
    actual: &[f64],
    expected: &[f64],
    data_type: DataType,
    tolerance: f64,
) -> Comparison {
    if actual.len() != expected.len() {
        return Comparison {
            passed: false,
            max_relative_error: f64::INFINITY,
        };
    }

    let max_relative_error = actual
        .iter()
        .zip(expected)
        .map(|(&a, &e)| relative_error(a, e))
        .fold(0.0_f64, f64::max);

    Comparison {
        passed: max_relative_error <= tolerance * data_type.epsilon(),
        max_relative_error,
    }
}

/// Validation result of one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub max_relative_error: f64,
    /// Individual comparisons, labelled by the output they checked.
    pub checks: Vec<(&'static str, Comparison)>,
}

impl ValidationOutcome {
    /// Fold sub-comparisons: all must pass, the error is the maximum.
    pub fn combine(checks: Vec<(&'static str, Comparison)>) -> Self {
        let passed = checks.iter().all(|(_, c)| c.passed);
        let max_relative_error = checks
            .iter()
            .map(|(_, c)| c.max_relative_error)
            .fold(0.0_f64, f64::max);
        Self {
            passed,
            max_relative_error,
            checks,
        }
    }
}

fn compare_against<A: Accelerator + ?Sized>(
    device: &mut A,
    storage: &mut DlrmStorage,
    label: &'static str,
    actual: &DeviceBuffer,
    expected: &[f64],
    shape: (u32, u32, u32),
    tolerance: f64,
) -> Result<(&'static str, Comparison)> {
    let reference = storage.upload(device, actual.data_type(), expected)?;
    let comparison = device.compare(actual, &reference, shape, tolerance)?;
    if !comparison.passed {
        warn!(
            output = label,
            max_relative_error = comparison.max_relative_error,
            "output mismatch"
        );
    }
    Ok((label, comparison))
}

/// Validate a completed forward trial.
pub fn validate_forward<A: Accelerator + ?Sized>(
    device: &mut A,
    storage: &mut DlrmStorage,
    config: &ProblemConfig,
    tolerance: f64,
) -> Result<ValidationOutcome> {
    let (m, k, b) = (config.m() as usize, config.k() as usize, config.batch() as usize);
    let expected = reference::dlrm_forward(config.data_type(), &storage.host().input, m, k, b)?;
    debug!(elements = expected.len(), "computed forward reference");

    let output = storage.forward()?.output;
    let stride = config.output_batch_stride() as u32;
    let check = compare_against(
        device,
        storage,
        "output",
        &output,
        &expected,
        (1, stride, config.batch()),
        tolerance,
    )?;
    Ok(ValidationOutcome::combine(vec![check]))
}

/// Validate a completed backward trial: input gradient, bottom gradient
/// and the triangular reduction are compared independently.
pub fn validate_backward<A: Accelerator + ?Sized>(
    device: &mut A,
    storage: &mut DlrmStorage,
    config: &ProblemConfig,
    tolerance: f64,
) -> Result<ValidationOutcome> {
    let (m, k, b) = (config.m() as usize, config.k() as usize, config.batch() as usize);
    let host = storage.host();
    let expected = reference::dlrm_backward(
        config.data_type(),
        &host.input,
        &host.upstream_grad,
        m,
        k,
        b,
    )?;
    debug!(elements = expected.grad.len(), "computed backward reference");

    let bufs = storage.backward()?;
    let (mu, ku, bu) = (config.m(), config.k(), config.batch());
    let checks = vec![
        compare_against(
            device,
            storage,
            "grad",
            &bufs.grad,
            &expected.grad,
            (mu, ku, bu),
            tolerance,
        )?,
        compare_against(
            device,
            storage,
            "bottom_mlp_grad",
            &bufs.bottom_mlp_grad,
            &expected.bottom_mlp_grad,
            (1, ku, bu),
            tolerance,
        )?,
        compare_against(device, storage, "acc", &bufs.acc, &expected.acc, (mu, mu, bu), tolerance)?,
    ];
    Ok(ValidationOutcome::combine(checks))
}
