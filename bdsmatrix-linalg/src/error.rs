//! Error types shared across the crate.

use thiserror::Error;

/// Errors reported for malformed input.
///
/// Rank deficiency is deliberately absent here: a near-singular pivot is
/// an expected outcome, surfaced as a per-column flag set and a count on
/// [`crate::BlockCholesky`], and computation continues with the column
/// zeroed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Block sizes sum to {sum}, exceeding matrix dimension {n}")]
    BlockSizeOverflow { sum: usize, n: usize },

    #[error("Block {index} has size zero")]
    ZeroBlockSize { index: usize },

    #[error("Tolerance must be positive, got {tolerance}")]
    NonPositiveTolerance { tolerance: f64 },
}
