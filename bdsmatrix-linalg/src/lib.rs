//! bdsmatrix-linalg: linear algebra for block-diagonal symmetric matrices.
//!
//! Implements the numerical kernel behind the bdsmatrix storage class
//! from the R survival-analysis ecosystem: a symmetric matrix kept as a
//! sequence of dense diagonal blocks plus a dense border of trailing
//! columns. Provides Cholesky factorization, forward/backward triangular
//! solves, and inversion (full or restricted to the stored pattern), all
//! exploiting the block structure to avoid O(n^3) work.
//!
//! Rank deficiency is an expected outcome, not an error: near-zero
//! pivots are zeroed and counted, and solves treat the flagged columns
//! as zero components, consistent with a pseudo-inverse. Only malformed
//! input (bad block sizes, non-positive tolerance, mismatched buffers)
//! is reported as an error.

pub mod block;
pub mod cholesky;
pub mod dense;
pub mod error;

pub use block::BlockMatrix;
pub use cholesky::{inverse_bds, solve_bds, BlockCholesky, SolveMode};
pub use dense::DenseMatrix;
pub use error::LinalgError;
