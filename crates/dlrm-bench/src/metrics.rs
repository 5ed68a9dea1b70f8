//! Throughput and efficiency derivation.

/// Efficiency sentinel for trials that were not measured.
pub const EFFICIENCY_UNSET: f64 = -1.0;

/// FLOPs of one interaction pass in GFLOP: a multiply and an add per
/// output element per contraction step, for every batch element.
pub fn calculate_gflops(output_size: u64, batch: u32, k: u32) -> f64 {
    2.0 * output_size as f64 * batch as f64 * k as f64 * 1.0e-9
}

/// Measured throughput in TFLOP/s (GFLOP per millisecond), corrected for
/// `repeats` launches folded into one timed window.
pub fn calculate_tflops_per_sec(
    output_size: u64,
    batch: u32,
    k: u32,
    elapsed_ms: f64,
    repeats: u32,
) -> f64 {
    if elapsed_ms <= 0.0 {
        return 0.0;
    }
    calculate_gflops(output_size, batch, k) / elapsed_ms * repeats as f64
}

/// Measured TFLOP/s over peak GFLOP/s, scaled by 100000 and rounded: a
/// percentage that keeps three decimals of precision as an integer.
pub fn efficiency(measured_tflops_per_sec: f64, peak_gflops_per_sec: f64) -> f64 {
    if peak_gflops_per_sec <= 0.0 {
        return EFFICIENCY_UNSET;
    }
    (measured_tflops_per_sec / peak_gflops_per_sec * 100_000.0).round()
}

/// Derived performance figures of one trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub elapsed_ms: f64,
    pub total_gflops: f64,
    pub measured_tflops_per_sec: f64,
    pub efficiency: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            elapsed_ms: 0.0,
            total_gflops: 0.0,
            measured_tflops_per_sec: 0.0,
            efficiency: EFFICIENCY_UNSET,
        }
    }
}

/// Derive every metric from one timed window.
pub fn measure(
    elapsed_ms: f64,
    output_size: u64,
    batch: u32,
    k: u32,
    repeats: u32,
    peak_gflops_per_sec: f64,
) -> Metrics {
    let measured = calculate_tflops_per_sec(output_size, batch, k, elapsed_ms, repeats);
    Metrics {
        elapsed_ms,
        total_gflops: calculate_gflops(output_size, batch, k),
        measured_tflops_per_sec: measured,
        efficiency: efficiency(measured, peak_gflops_per_sec),
    }
}
