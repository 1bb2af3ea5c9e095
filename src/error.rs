// error.rs

use thiserror::Error;

/// Errors raised by the index core.
///
/// Per the error-handling policy: conditions that arise from ordinary data
/// irregularities (empty input, an unknown tier byte on decode) are *not*
/// represented here — they are logged with [`tracing::warn!`] and recovered
/// from locally (an empty result, a `None`). Only self-inconsistent
/// persistent state or a construction-time precondition violation becomes a
/// hard error.
#[derive(Error, Debug)]
pub enum SfcIndexError {
    #[error("dimension '{name}' has zero bits of precision")]
    ZeroPrecisionDimension { name: String },

    #[error("SFC has zero total bits of precision")]
    ZeroTotalPrecision,

    #[error("shift exceeds maximum allowable bit width for base_shift={base_shift}, num_levels={num_levels}")]
    ShiftOverflow { base_shift: u32, num_levels: usize },

    #[error("value {value} is outside dimension '{name}' range [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("invalid interval: end ({end}) must be greater than start ({start})")]
    InvalidInterval { start: f64, end: f64 },

    #[error("corrupt binary format: {reason}")]
    CorruptFormat { reason: String },

    #[error("dimension count mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("SFC dimensions must share one bit width; got {bits:?}")]
    UnequalDimensionBits { bits: Vec<u32> },

    #[error("tier byte {tier} is not mapped to any SFC in this strategy")]
    UnknownTier { tier: u8 },

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("bincode error: {0}")]
    BincodeError(String),
}

impl From<Box<bincode::ErrorKind>> for SfcIndexError {
    fn from(error: Box<bincode::ErrorKind>) -> Self {
        SfcIndexError::BincodeError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SfcIndexError>;
