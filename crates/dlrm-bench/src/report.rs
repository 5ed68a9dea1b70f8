//! Tabular trial reports.
//!
//! A [`ReportSession`] owns the output sink for a process (or a test) and
//! prints the header exactly once, before the first row. It also collects
//! the trials whose validation failed so that a driving loop can keep
//! running and assert once at the end.

use crate::error::Result;
use crate::metrics::Metrics;
use crate::types::{DataType, Direction};
use std::io::{self, Write};

/// Placeholder for fields that do not apply to a trial.
pub const NOT_APPLICABLE: &str = "n/a";

/// Format like a default C++ stream: `%g` with six significant digits.
pub fn format_general(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if value == 0.0 {
        return "0".into();
    }

    // Round to six significant digits first; the exponent after rounding
    // decides between fixed and scientific notation.
    let sci = format!("{value:.5e}");
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if !(-4..6).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (5 - exponent) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

// ============================================================================
// Records
// ============================================================================

/// Final classification of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    /// The compatibility gate rejected the configuration.
    Skipped,
    Passed,
    Failed,
    /// Ran without validation.
    Bench,
}

impl TrialOutcome {
    pub fn token(&self) -> &'static str {
        match self {
            TrialOutcome::Skipped => "SKIPPED",
            TrialOutcome::Passed => "PASSED",
            TrialOutcome::Failed => "FAILED",
            TrialOutcome::Bench => "BENCH",
        }
    }
}

/// Validation figures shown in a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationFields {
    pub max_relative_error: f64,
    pub tolerance: f64,
}

/// Everything one report row shows.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub tile_size: u32,
    pub data_type: DataType,
    pub direction: Direction,
    pub m: u32,
    pub k: u32,
    pub batch: u32,
    pub outcome: TrialOutcome,
    /// `None` when nothing was measured.
    pub metrics: Option<Metrics>,
    pub validation: Option<ValidationFields>,
}

impl TrialRecord {
    fn label(&self) -> String {
        format!(
            "{} {} {} M={} K={} B={}",
            self.direction.name(),
            self.data_type,
            self.tile_size,
            self.m,
            self.k,
            self.batch
        )
    }
}

/// Column header for the given mode.
pub fn header(validation: bool) -> String {
    let mut cols = vec!["TileSize", "DataT", "Direction", "MatM", "MatK", "MatB"];
    if validation {
        cols.extend(["maxRelativeDiff", "tolerance"]);
    }
    cols.extend(["elapsedMs", "Problem Size(GFlops)", "TFlops/s", "Efficiency(%)"]);
    cols.join(", ")
}

/// One data row, terminated by the outcome token.
pub fn format_row(record: &TrialRecord, validation: bool) -> String {
    let mut cols = vec![
        record.tile_size.to_string(),
        record.data_type.to_string(),
        record.direction.name().to_string(),
        record.m.to_string(),
        record.k.to_string(),
        record.batch.to_string(),
    ];

    if validation {
        match record.validation {
            Some(v) if record.outcome != TrialOutcome::Skipped => {
                cols.push(format_general(v.max_relative_error));
                cols.push(format_general(v.tolerance));
            }
            _ => cols.extend([NOT_APPLICABLE.to_string(), NOT_APPLICABLE.to_string()]),
        }
    }

    match record.metrics {
        Some(m) if record.outcome != TrialOutcome::Skipped => cols.extend([
            format_general(m.elapsed_ms),
            format_general(m.total_gflops),
            format_general(m.measured_tflops_per_sec),
            format_general(m.efficiency),
        ]),
        _ => cols.extend(std::iter::repeat(NOT_APPLICABLE.to_string()).take(4)),
    }

    cols.push(record.outcome.token().to_string());
    cols.join(", ")
}

// ============================================================================
// Session
// ============================================================================

/// Report sink shared by every trial of a run.
pub struct ReportSession<W: Write> {
    sink: W,
    validation: bool,
    header_printed: bool,
    failures: Vec<String>,
}

impl ReportSession<io::Stdout> {
    /// Session writing to standard output.
    pub fn stdout(validation: bool) -> Self {
        Self::new(io::stdout(), validation)
    }
}

impl<W: Write> ReportSession<W> {
    pub fn new(sink: W, validation: bool) -> Self {
        Self {
            sink,
            validation,
            header_printed: false,
            failures: Vec::new(),
        }
    }

    pub fn validation(&self) -> bool {
        self.validation
    }

    pub fn header_printed(&self) -> bool {
        self.header_printed
    }

    /// Emit one row, preceded by the header if this is the first.
    pub fn report(&mut self, record: &TrialRecord) -> Result<()> {
        if !self.header_printed {
            writeln!(self.sink, "{}", header(self.validation))?;
            self.header_printed = true;
        }
        writeln!(self.sink, "{}", format_row(record, self.validation))?;
        self.sink.flush()?;

        if record.outcome == TrialOutcome::Failed {
            self.failures.push(record.label());
        }
        Ok(())
    }

    /// Trials whose validation failed so far.
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// Panic listing every failed trial, if any.
    pub fn assert_all_passed(&self) {
        assert!(
            self.failures.is_empty(),
            "{} trial(s) failed validation:\n  {}",
            self.failures.len(),
            self.failures.join("\n  ")
        );
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}
