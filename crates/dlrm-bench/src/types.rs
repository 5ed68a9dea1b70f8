//! Element types, pass directions and accelerator architecture ids.
//!
//! The harness is specialized at runtime over the element type stored in
//! every buffer:
//!
//! | Type | Report name | Storage | ε used for validation |
//! |------|-------------|---------|-----------------------|
//! | [`DataType::F16`] | `f16` | IEEE binary16 | 2⁻¹⁰ |
//! | [`DataType::H16`] | `h16` | IEEE binary16 (host half) | 2⁻¹⁰ |
//! | [`DataType::BF16`] | `bf16` | bfloat16 | 2⁻⁷ |
//! | [`DataType::F32`] | `f32` | binary32 | `f32::EPSILON` |
//! | [`DataType::F64`] | `f64` | binary64 | `f64::EPSILON` |
//! | [`DataType::I8`] | `i8` | saturating int8 | 0 (exact) |
//!
//! Host-side values are carried as `f64` and rounded to the element type
//! with [`DataType::quantize`] whenever they are written to a buffer.

use half::{bf16, f16};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of the interaction inputs and outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    F16,
    H16,
    BF16,
    F32,
    F64,
    I8,
}

impl DataType {
    /// Every element type the harness knows about.
    pub const ALL: [DataType; 6] = [
        DataType::F16,
        DataType::H16,
        DataType::BF16,
        DataType::F32,
        DataType::F64,
        DataType::I8,
    ];

    /// Short name used in report rows.
    pub fn name(self) -> &'static str {
        match self {
            DataType::F16 => "f16",
            DataType::H16 => "h16",
            DataType::BF16 => "bf16",
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::I8 => "i8",
        }
    }

    /// Storage size of one element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DataType::F16 | DataType::H16 | DataType::BF16 => 2,
            DataType::F32 => 4,
            DataType::F64 => 8,
            DataType::I8 => 1,
        }
    }

    /// 16-bit IEEE float, either flavour.
    pub fn is_f16(self) -> bool {
        matches!(self, DataType::F16 | DataType::H16)
    }

    /// Machine epsilon of the element type.
    pub fn epsilon(self) -> f64 {
        match self {
            DataType::F16 | DataType::H16 => f16::EPSILON.to_f64(),
            DataType::BF16 => bf16::EPSILON.to_f64(),
            DataType::F32 => f32::EPSILON as f64,
            DataType::F64 => f64::EPSILON,
            DataType::I8 => 0.0,
        }
    }

    /// Round a host value to the nearest representable element value.
    pub fn quantize(self, value: f64) -> f64 {
        match self {
            DataType::F16 | DataType::H16 => f16::from_f64(value).to_f64(),
            DataType::BF16 => bf16::from_f64(value).to_f64(),
            DataType::F32 => value as f32 as f64,
            DataType::F64 => value,
            DataType::I8 => {
                if value.is_nan() {
                    0.0
                } else {
                    value.round().clamp(i8::MIN as f64, i8::MAX as f64)
                }
            }
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pass direction of the interaction layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    /// Token printed in the report's `Direction` column.
    pub fn name(self) -> &'static str {
        match self {
            Direction::Forward => "Forwards",
            Direction::Backward => "Backwards",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// GCN architecture id reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    #[default]
    Unsupported,
    Gfx908,
    Gfx90a,
    Gfx940,
    Gfx941,
    Gfx942,
    Gfx1100,
    Gfx1101,
    Gfx1102,
}

impl Architecture {
    /// Parse a device arch string such as `gfx90a:sramecc+:xnack-`.
    ///
    /// Target feature suffixes are ignored; unknown names map to
    /// [`Architecture::Unsupported`].
    pub fn from_gcn_name(name: &str) -> Self {
        let base = name.split(':').next().unwrap_or_default().trim();
        match base.to_ascii_lowercase().as_str() {
            "gfx908" => Architecture::Gfx908,
            "gfx90a" => Architecture::Gfx90a,
            "gfx940" => Architecture::Gfx940,
            "gfx941" => Architecture::Gfx941,
            "gfx942" => Architecture::Gfx942,
            "gfx1100" => Architecture::Gfx1100,
            "gfx1101" => Architecture::Gfx1101,
            "gfx1102" => Architecture::Gfx1102,
            _ => Architecture::Unsupported,
        }
    }

    /// The CDNA1 family without f64 matrix cores.
    pub fn is_gfx908(self) -> bool {
        self == Architecture::Gfx908
    }

    /// The RDNA3 family.
    pub fn is_gfx11(self) -> bool {
        matches!(
            self,
            Architecture::Gfx1100 | Architecture::Gfx1101 | Architecture::Gfx1102
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Architecture::Unsupported => "unsupported",
            Architecture::Gfx908 => "gfx908",
            Architecture::Gfx90a => "gfx90a",
            Architecture::Gfx940 => "gfx940",
            Architecture::Gfx941 => "gfx941",
            Architecture::Gfx942 => "gfx942",
            Architecture::Gfx1100 => "gfx1100",
            Architecture::Gfx1101 => "gfx1101",
            Architecture::Gfx1102 => "gfx1102",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
