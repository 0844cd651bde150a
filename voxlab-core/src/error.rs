//! Structured error types for the voxlab toolkit.

use thiserror::Error;

/// Unified error type for all voxlab operations.
#[derive(Debug, Error)]
pub enum VoxlabError {
    /// I/O error (file not found, permission denied, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error (malformed input data)
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid input (bad arguments, out-of-range values)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Two arrays that must agree on an axis length do not.
    #[error("dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    /// A probability vector or matrix row does not sum to one.
    #[error("{what} sums to {sum}, expected 1.0")]
    Normalization { what: String, sum: f64 },

    /// A state received no posterior mass, so its Gaussian cannot be re-estimated.
    #[error("degenerate state {state}: posterior mass {mass} cannot normalise the update")]
    DegenerateState { state: usize, mass: f64 },

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

impl VoxlabError {
    /// Shorthand for a [`VoxlabError::DimensionMismatch`].
    pub fn dimension(what: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            found,
        }
    }
}

/// Convenience alias used throughout the voxlab crates.
pub type Result<T> = std::result::Result<T, VoxlabError>;
