//! Problem description and harness settings.

use crate::error::{DlrmError, Result};
use crate::types::{DataType, Direction};
use serde::{Deserialize, Serialize};
use std::env;

/// Repeat count used for pure performance runs.
pub const BENCH_REPEATS: u32 = 5;

/// Repeat count used when outputs are validated.
pub const VALIDATION_REPEATS: u32 = 1;

/// Default relative tolerance multiplier for output comparison.
pub const DEFAULT_TOLERANCE: f64 = 10.0;

/// Default fill seed.
pub const DEFAULT_SEED: u64 = 5489;

/// Integer ceiling division.
#[inline]
pub fn ceil_div(numerator: u32, denominator: u32) -> u32 {
    numerator.div_ceil(denominator)
}

/// Raw parameters of one trial, as supplied by the test loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProblemParams {
    /// Square tile dimension processed by one wave.
    pub tile_size: u32,
    pub data_type: DataType,
    /// Launch block extent `(x, y)`.
    pub thread_block: (u32, u32),
    /// `(M, K, B)`.
    pub problem_size: (u32, u32, u32),
    pub direction: Direction,
}

/// Immutable configuration of one benchmark trial.
///
/// Padded dimensions are derived once here. The fast dispatch path only
/// runs when they equal the unpadded ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProblemConfig {
    m: u32,
    k: u32,
    b: u32,
    m_padded: u32,
    k_padded: u32,
    tile_size: u32,
    block_x: u32,
    block_y: u32,
    data_type: DataType,
    direction: Direction,
}

impl ProblemConfig {
    pub fn new(params: &ProblemParams) -> Result<Self> {
        let (m, k, b) = params.problem_size;
        let (block_x, block_y) = params.thread_block;

        if params.tile_size == 0 {
            return Err(DlrmError::InvalidProblem("tile size must be non-zero".into()));
        }
        if block_x == 0 || block_y == 0 {
            return Err(DlrmError::InvalidProblem(format!(
                "thread block ({block_x}, {block_y}) has a zero extent"
            )));
        }

        let tile = params.tile_size;
        Ok(Self {
            m,
            k,
            b,
            m_padded: ceil_div(m, tile) * tile,
            k_padded: ceil_div(k, tile) * tile,
            tile_size: tile,
            block_x,
            block_y,
            data_type: params.data_type,
            direction: params.direction,
        })
    }

    pub fn m(&self) -> u32 {
        self.m
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn batch(&self) -> u32 {
        self.b
    }

    pub fn m_padded(&self) -> u32 {
        self.m_padded
    }

    pub fn k_padded(&self) -> u32 {
        self.k_padded
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn block_x(&self) -> u32 {
        self.block_x
    }

    pub fn block_y(&self) -> u32 {
        self.block_y
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Both dimensions are already tile multiples.
    pub fn is_aligned(&self) -> bool {
        self.m == self.m_padded && self.k == self.k_padded
    }

    /// Elements per batch in the input matrix: `M·K`.
    pub fn input_batch_stride(&self) -> usize {
        self.m as usize * self.k as usize
    }

    /// Elements per batch in the interaction output (and upstream gradient):
    /// the strictly-triangular pairs plus the `K` passthrough features.
    pub fn output_batch_stride(&self) -> usize {
        let m = self.m as usize;
        m * m.saturating_sub(1) / 2 + self.k as usize
    }

    /// Elements per batch in the `M×M` accumulator.
    pub fn acc_batch_stride(&self) -> usize {
        self.m as usize * self.m as usize
    }

    pub fn input_len(&self) -> usize {
        self.input_batch_stride() * self.b as usize
    }

    pub fn output_len(&self) -> usize {
        self.output_batch_stride() * self.b as usize
    }

    pub fn acc_len(&self) -> usize {
        self.acc_batch_stride() * self.b as usize
    }

    pub fn bottom_mlp_grad_len(&self) -> usize {
        self.k as usize * self.b as usize
    }

    /// Per-batch result size used for FLOP counting: the full interaction
    /// matrix forwards, the full input gradient backwards.
    pub fn output_size(&self) -> u64 {
        match self.direction {
            Direction::Forward => self.m as u64 * self.m as u64,
            Direction::Backward => self.m as u64 * self.k as u64,
        }
    }
}

/// Settings shared by every trial in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Run the host reference and compare outputs.
    pub validate: bool,
    /// Launch sequence repeats inside the timed window. `None` selects
    /// [`BENCH_REPEATS`] or [`VALIDATION_REPEATS`].
    pub repeats: Option<u32>,
    /// Multiplier applied to the element type's epsilon.
    pub tolerance: f64,
    /// Seed for the input fill.
    pub seed: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            validate: false,
            repeats: None,
            tolerance: DEFAULT_TOLERANCE,
            seed: DEFAULT_SEED,
        }
    }
}

impl HarnessConfig {
    /// Benchmark-only settings.
    pub fn bench() -> Self {
        Self::default()
    }

    /// Validation settings.
    pub fn validation() -> Self {
        Self {
            validate: true,
            ..Self::default()
        }
    }

    /// Effective repeat count.
    pub fn repeats(&self) -> u32 {
        match self.repeats {
            Some(r) => r.max(1),
            None if self.validate => VALIDATION_REPEATS,
            None => BENCH_REPEATS,
        }
    }

    /// Parse settings from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DlrmError::Config(e.to_string()))
    }

    /// Defaults overlaid with `DLRM_BENCH_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DLRM_BENCH_VALIDATE") {
            self.validate = parse_flag("DLRM_BENCH_VALIDATE", &v)?;
        }
        if let Some(v) = lookup("DLRM_BENCH_REPEATS") {
            self.repeats = Some(parse_value("DLRM_BENCH_REPEATS", &v)?);
        }
        if let Some(v) = lookup("DLRM_BENCH_TOLERANCE") {
            self.tolerance = parse_value("DLRM_BENCH_TOLERANCE", &v)?;
        }
        if let Some(v) = lookup("DLRM_BENCH_SEED") {
            self.seed = parse_value("DLRM_BENCH_SEED", &v)?;
        }
        Ok(self)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(DlrmError::Config(format!("{key}: expected a boolean, got {other:?}"))),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DlrmError::Config(format!("{key}: cannot parse {value:?}")))
}
