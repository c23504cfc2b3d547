#![allow(clippy::needless_range_loop)]
//! Cholesky factorization of bordered block-diagonal matrices.
//!
//! Factors A = L * L' in place, processing the diagonal blocks first
//! (each block column couples only to its own block and the border
//! rows) and then the dense corner. The bordered block-diagonal
//! pattern is closed under Cholesky, so fill-in is confined to the
//! border and the cost stays near O(n * maxBlock^2 + n * r^2) instead
//! of O(n^3).
//!
//! A pivot at or below the tolerance, relative to that column's
//! original diagonal magnitude, marks the column singular: the column
//! is zeroed and factorization continues. Solves and inversion then
//! produce zero components for flagged columns, consistent with a
//! pseudo-inverse.

use std::ops::Range;

use tracing::{debug, warn};

use crate::block::BlockMatrix;
use crate::dense::DenseMatrix;
use crate::error::LinalgError;

/// Which triangular passes [`BlockCholesky::solve_in_place`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMode {
    /// Forward elimination only: L * y = b.
    Forward,
    /// Back-substitution only: L' * x = y.
    Backward,
    /// Both passes: (L * L') * x = b.
    Full,
}

/// The factored form of a [`BlockMatrix`].
///
/// Owns the input matrix's storage, overwritten with the lower factor
/// L, plus the per-column singular flags. Consuming the matrix on
/// factorization means the factors can never be invalidated by later
/// mutation of the source.
pub struct BlockCholesky {
    factor: BlockMatrix,
    singular: Vec<bool>,
    tolerance: f64,
}

impl BlockCholesky {
    /// Factor a bordered block-diagonal symmetric matrix in place.
    ///
    /// `tolerance` must be positive; a pivot d_j <= tolerance * |A[j][j]|
    /// flags column j as singular rather than failing. Check
    /// [`singular_count`](Self::singular_count) afterwards if full rank
    /// matters to the caller.
    pub fn factorize(matrix: BlockMatrix, tolerance: f64) -> Result<Self, LinalgError> {
        if !(tolerance > 0.0) {
            return Err(LinalgError::NonPositiveTolerance { tolerance });
        }
        let n = matrix.n();
        let nb = matrix.block_dim();
        let mut m = matrix;
        let mut singular = vec![false; n];
        let thresholds: Vec<f64> = (0..n).map(|j| tolerance * m.get(j, j).abs()).collect();

        // Diagonal blocks. Column j of block [s, e) has non-zeros only
        // in rows j..e and the border rows.
        for b in 0..m.nblocks() {
            let s = m.block_start(b);
            let e = s + m.block_sizes()[b];
            for j in s..e {
                let mut d = m.get(j, j);
                for k in s..j {
                    let ljk = m.get(j, k);
                    d -= ljk * ljk;
                }
                if d <= thresholds[j] {
                    singular[j] = true;
                    m.set(j, j, 0.0);
                    for i in j + 1..e {
                        m.set(i, j, 0.0);
                    }
                    for i in nb..n {
                        m.set(i, j, 0.0);
                    }
                    continue;
                }
                let ljj = d.sqrt();
                m.set(j, j, ljj);
                for i in j + 1..e {
                    let mut v = m.get(i, j);
                    for k in s..j {
                        v -= m.get(i, k) * m.get(j, k);
                    }
                    m.set(i, j, v / ljj);
                }
                for i in nb..n {
                    let mut v = m.get(i, j);
                    for k in s..j {
                        v -= m.get(i, k) * m.get(j, k);
                    }
                    m.set(i, j, v / ljj);
                }
            }
        }

        // Dense corner. Border rows are dense in L, so every earlier
        // column contributes.
        for j in nb..n {
            let mut d = m.get(j, j);
            for k in 0..j {
                let ljk = m.get(j, k);
                d -= ljk * ljk;
            }
            if d <= thresholds[j] {
                singular[j] = true;
                for i in j..n {
                    m.set(i, j, 0.0);
                }
                continue;
            }
            let ljj = d.sqrt();
            m.set(j, j, ljj);
            for i in j + 1..n {
                let mut v = m.get(i, j);
                for k in 0..j {
                    v -= m.get(i, k) * m.get(j, k);
                }
                m.set(i, j, v / ljj);
            }
        }

        let nsing = singular.iter().filter(|s| **s).count();
        if nsing > 0 {
            warn!(
                "Factorization is rank deficient: {} of {} columns singular",
                nsing, n
            );
        }
        debug!("Factorized {}x{} matrix, rank {}", n, n, n - nsing);
        Ok(BlockCholesky {
            factor: m,
            singular,
            tolerance,
        })
    }

    /// Matrix dimension n.
    pub fn n(&self) -> usize {
        self.factor.n()
    }

    /// The tolerance the factorization was computed with.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// The lower factor L, in the same block storage as the input.
    pub fn factor(&self) -> &BlockMatrix {
        &self.factor
    }

    /// Number of columns flagged singular (0 means full rank).
    pub fn singular_count(&self) -> usize {
        self.singular.iter().filter(|s| **s).count()
    }

    /// Whether column `col` was flagged singular.
    pub fn is_singular(&self, col: usize) -> bool {
        self.singular[col]
    }

    /// Numerical rank, n minus the singular count.
    pub fn rank(&self) -> usize {
        self.n() - self.singular_count()
    }

    /// Forward elimination L * y = b over the given block range plus
    /// the border. Blocks outside the range are assumed to carry a zero
    /// right-hand side and are skipped.
    fn forward_in_place(&self, y: &mut [f64], blocks: Range<usize>) {
        let m = &self.factor;
        let n = m.n();
        let nb = m.block_dim();
        for b in blocks {
            let s = m.block_start(b);
            let e = s + m.block_sizes()[b];
            for j in s..e {
                if self.singular[j] {
                    y[j] = 0.0;
                    continue;
                }
                let yj = y[j] / m.get(j, j);
                y[j] = yj;
                for i in j + 1..e {
                    y[i] -= m.get(i, j) * yj;
                }
                for i in nb..n {
                    y[i] -= m.get(i, j) * yj;
                }
            }
        }
        for j in nb..n {
            if self.singular[j] {
                y[j] = 0.0;
                continue;
            }
            let yj = y[j] / m.get(j, j);
            y[j] = yj;
            for i in j + 1..n {
                y[i] -= m.get(i, j) * yj;
            }
        }
    }

    /// Back-substitution L' * x = y over the given block range plus the
    /// border. Components in skipped blocks are left untouched.
    fn backward_in_place(&self, x: &mut [f64], blocks: Range<usize>) {
        let m = &self.factor;
        let n = m.n();
        let nb = m.block_dim();
        // Border columns sit below every block column in L'.
        for j in (nb..n).rev() {
            if self.singular[j] {
                x[j] = 0.0;
                continue;
            }
            let mut v = x[j];
            for i in j + 1..n {
                v -= m.get(i, j) * x[i];
            }
            x[j] = v / m.get(j, j);
        }
        for b in blocks.rev() {
            let s = m.block_start(b);
            let e = s + m.block_sizes()[b];
            for j in (s..e).rev() {
                if self.singular[j] {
                    x[j] = 0.0;
                    continue;
                }
                let mut v = x[j];
                for i in j + 1..e {
                    v -= m.get(i, j) * x[i];
                }
                for i in nb..n {
                    v -= m.get(i, j) * x[i];
                }
                x[j] = v / m.get(j, j);
            }
        }
    }

    /// Solve against a single right-hand side, in place.
    ///
    /// Components belonging to singular columns come back zero.
    pub fn solve_in_place(&self, rhs: &mut [f64], mode: SolveMode) -> Result<(), LinalgError> {
        if rhs.len() != self.n() {
            return Err(LinalgError::DimensionMismatch {
                expected: self.n(),
                got: rhs.len(),
            });
        }
        let all = 0..self.factor.nblocks();
        match mode {
            SolveMode::Forward => self.forward_in_place(rhs, all),
            SolveMode::Backward => self.backward_in_place(rhs, all),
            SolveMode::Full => {
                self.forward_in_place(rhs, all.clone());
                self.backward_in_place(rhs, all);
            }
        }
        Ok(())
    }

    /// Solve against every column of a dense right-hand side, in place.
    pub fn solve_mat_in_place(
        &self,
        rhs: &mut DenseMatrix,
        mode: SolveMode,
    ) -> Result<(), LinalgError> {
        if rhs.nrows() != self.n() {
            return Err(LinalgError::DimensionMismatch {
                expected: self.n(),
                got: rhs.nrows(),
            });
        }
        for c in 0..rhs.ncols() {
            let mut col = rhs.col(c);
            self.solve_in_place(&mut col, mode)?;
            rhs.set_col(c, &col);
        }
        Ok(())
    }

    /// Full n x n inverse, built by solving unit basis vectors.
    ///
    /// Singular columns contribute a zero row and column.
    pub fn inverse_full(&self) -> DenseMatrix {
        let n = self.n();
        let all = 0..self.factor.nblocks();
        let mut inv = DenseMatrix::zeros(n, n);
        let mut e = vec![0.0; n];
        for j in 0..n {
            for v in e.iter_mut() {
                *v = 0.0;
            }
            e[j] = 1.0;
            self.forward_in_place(&mut e, all.clone());
            self.backward_in_place(&mut e, all.clone());
            inv.set_col(j, &e);
        }
        inv
    }

    /// The entries of the inverse inside the stored pattern only
    /// (diagonal blocks plus border), as a block matrix.
    ///
    /// Solving the basis vector for a block column never leaves that
    /// block and the border, which keeps the cost bounded by the block
    /// sizes rather than n^2 per column.
    pub fn inverse_blocks(&self) -> BlockMatrix {
        let m = &self.factor;
        let n = m.n();
        let nb = m.block_dim();
        let mut inv = m.same_pattern();
        let mut e = vec![0.0; n];
        for b in 0..m.nblocks() {
            let s = m.block_start(b);
            let end = s + m.block_sizes()[b];
            for j in s..end {
                for v in e.iter_mut() {
                    *v = 0.0;
                }
                e[j] = 1.0;
                self.forward_in_place(&mut e, b..b + 1);
                self.backward_in_place(&mut e, b..b + 1);
                for i in j..end {
                    inv.set(i, j, e[i]);
                }
                for i in nb..n {
                    inv.set(i, j, e[i]);
                }
            }
        }
        // Corner columns: the forward pass never touches block rows, and
        // the cross entries were already filled by the block columns.
        for j in nb..n {
            for v in e.iter_mut() {
                *v = 0.0;
            }
            e[j] = 1.0;
            self.forward_in_place(&mut e, 0..0);
            self.backward_in_place(&mut e, 0..0);
            for i in j..n {
                inv.set(i, j, e[i]);
            }
        }
        inv
    }
}

/// Factor `matrix` and solve (L * L') * x = rhs in one call.
///
/// The right-hand side is overwritten with the solution; the returned
/// factorization can be reused for further solves.
pub fn solve_bds(
    matrix: BlockMatrix,
    rhs: &mut [f64],
    tolerance: f64,
) -> Result<BlockCholesky, LinalgError> {
    let chol = BlockCholesky::factorize(matrix, tolerance)?;
    chol.solve_in_place(rhs, SolveMode::Full)?;
    Ok(chol)
}

/// Factor `matrix` and return its full dense (pseudo-)inverse.
pub fn inverse_bds(matrix: BlockMatrix, tolerance: f64) -> Result<DenseMatrix, LinalgError> {
    Ok(BlockCholesky::factorize(matrix, tolerance)?.inverse_full())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    fn spd_4x4() -> DenseMatrix {
        DenseMatrix::from_row_major(
            4,
            4,
            &[
                4.0, 2.0, 0.0, 1.0, //
                2.0, 5.0, 0.0, 0.5, //
                0.0, 0.0, 3.0, 0.3, //
                1.0, 0.5, 0.3, 6.0,
            ],
        )
    }

    #[test]
    fn test_factor_known_2x2() {
        // A = [[4, 2], [2, 3]] has L = [[2, 0], [1, sqrt(2)]].
        let a = DenseMatrix::from_row_major(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let m = BlockMatrix::from_dense(&a, &[2]).unwrap();
        let chol = BlockCholesky::factorize(m, TOL).unwrap();
        assert_eq!(chol.singular_count(), 0);
        let l = chol.factor();
        assert!((l.get(0, 0) - 2.0).abs() < 1e-10);
        assert!((l.get(1, 0) - 1.0).abs() < 1e-10);
        assert!((l.get(1, 1) - 2.0f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn test_solve_reconstructs_rhs() {
        let a = spd_4x4();
        let m = BlockMatrix::from_dense(&a, &[2, 1]).unwrap();
        let chol = BlockCholesky::factorize(m, TOL).unwrap();
        let b = vec![1.0, -2.0, 3.0, 0.5];
        let mut x = b.clone();
        chol.solve_in_place(&mut x, SolveMode::Full).unwrap();
        let ax = a.mat_vec(&x);
        for i in 0..4 {
            assert!((ax[i] - b[i]).abs() < 1e-10, "ax[{}]={} b[{}]={}", i, ax[i], i, b[i]);
        }
    }

    #[test]
    fn test_forward_then_backward_equals_full() {
        let m = BlockMatrix::from_dense(&spd_4x4(), &[2, 1]).unwrap();
        let chol = BlockCholesky::factorize(m, TOL).unwrap();
        let b = vec![0.3, 1.0, -1.0, 2.0];
        let mut split = b.clone();
        chol.solve_in_place(&mut split, SolveMode::Forward).unwrap();
        chol.solve_in_place(&mut split, SolveMode::Backward).unwrap();
        let mut full = b.clone();
        chol.solve_in_place(&mut full, SolveMode::Full).unwrap();
        for i in 0..4 {
            assert!((split[i] - full[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_inverse_full() {
        let a = spd_4x4();
        let m = BlockMatrix::from_dense(&a, &[2, 1]).unwrap();
        let inv = BlockCholesky::factorize(m, TOL).unwrap().inverse_full();
        let prod = a.mat_mul(&inv);
        assert!(prod.max_abs_diff(&DenseMatrix::identity(4)) < 1e-10);
    }

    #[test]
    fn test_inverse_blocks_matches_full() {
        let a = spd_4x4();
        let m = BlockMatrix::from_dense(&a, &[2, 1]).unwrap();
        let chol = BlockCholesky::factorize(m, TOL).unwrap();
        let full = chol.inverse_full();
        let blocks = chol.inverse_blocks();
        // Every stored pattern entry agrees with the full inverse. For
        // blocks [2, 1] on n = 4 the only off-pattern entries are
        // (2, 0) and (2, 1).
        for j in 0..4 {
            for i in j..4 {
                if i == 2 && j < 2 {
                    continue;
                }
                assert!(
                    (blocks.get(i, j) - full.get(i, j)).abs() < 1e-10,
                    "inv[{},{}]: {} vs {}",
                    i,
                    j,
                    blocks.get(i, j),
                    full.get(i, j)
                );
            }
        }
    }

    #[test]
    fn test_rank_deficient_rank_one() {
        // Rank-1 outer product: second pivot is exactly zero.
        let a = DenseMatrix::from_row_major(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let m = BlockMatrix::from_dense(&a, &[2]).unwrap();
        let chol = BlockCholesky::factorize(m, TOL).unwrap();
        assert_eq!(chol.singular_count(), 1);
        assert!(chol.is_singular(1));
        assert_eq!(chol.rank(), 1);
        let inv = chol.inverse_full();
        // The singular column contributes a zero row and column.
        assert_eq!(inv.get(0, 1), 0.0);
        assert_eq!(inv.get(1, 0), 0.0);
        assert_eq!(inv.get(1, 1), 0.0);
        assert!((inv.get(0, 0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_singular_solve_zeroes_component() {
        let a = DenseMatrix::from_row_major(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let m = BlockMatrix::from_dense(&a, &[2]).unwrap();
        let chol = BlockCholesky::factorize(m, TOL).unwrap();
        let mut x = vec![2.0, 5.0];
        chol.solve_in_place(&mut x, SolveMode::Full).unwrap();
        assert_eq!(x[1], 0.0);
        assert!(x[0].is_finite());
    }

    #[test]
    fn test_blocked_matches_dense_when_off_block_zero() {
        // Blocks [2, 2] versus one dense block of size 4; the off-block
        // entries of the underlying matrix are zero, so results agree.
        let a = DenseMatrix::from_row_major(
            4,
            4,
            &[
                4.0, 1.0, 0.0, 0.0, //
                1.0, 3.0, 0.0, 0.0, //
                0.0, 0.0, 5.0, 2.0, //
                0.0, 0.0, 2.0, 4.0,
            ],
        );
        let blocked = BlockMatrix::from_dense(&a, &[2, 2]).unwrap();
        let dense = BlockMatrix::from_dense(&a, &[4]).unwrap();
        let cb = BlockCholesky::factorize(blocked, TOL).unwrap();
        let cd = BlockCholesky::factorize(dense, TOL).unwrap();
        assert_eq!(cb.singular_count(), cd.singular_count());
        assert!(cb.inverse_full().max_abs_diff(&cd.inverse_full()) < 1e-10);
        let b = vec![1.0, 2.0, 3.0, 4.0];
        let mut xb = b.clone();
        let mut xd = b.clone();
        cb.solve_in_place(&mut xb, SolveMode::Full).unwrap();
        cd.solve_in_place(&mut xd, SolveMode::Full).unwrap();
        for i in 0..4 {
            assert!((xb[i] - xd[i]).abs() < 1e-10);
        }
    }

    #[test]
    fn test_invalid_tolerance() {
        let m = BlockMatrix::from_dense(&spd_4x4(), &[2, 1]).unwrap();
        assert!(matches!(
            BlockCholesky::factorize(m.clone(), -1.0),
            Err(LinalgError::NonPositiveTolerance { .. })
        ));
        assert!(matches!(
            BlockCholesky::factorize(m, 0.0),
            Err(LinalgError::NonPositiveTolerance { .. })
        ));
    }

    #[test]
    fn test_rhs_dimension_checked() {
        let m = BlockMatrix::from_dense(&spd_4x4(), &[2, 1]).unwrap();
        let chol = BlockCholesky::factorize(m, TOL).unwrap();
        let mut short = vec![1.0; 3];
        assert!(matches!(
            chol.solve_in_place(&mut short, SolveMode::Full),
            Err(LinalgError::DimensionMismatch { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn test_solve_mat_in_place() {
        let a = spd_4x4();
        let m = BlockMatrix::from_dense(&a, &[2, 1]).unwrap();
        let chol = BlockCholesky::factorize(m, TOL).unwrap();
        let mut rhs = DenseMatrix::identity(4);
        chol.solve_mat_in_place(&mut rhs, SolveMode::Full).unwrap();
        // Solving against I yields the inverse.
        assert!(rhs.max_abs_diff(&chol.inverse_full()) < 1e-12);
        let prod = a.mat_mul(&rhs);
        assert!(prod.max_abs_diff(&DenseMatrix::identity(4)) < 1e-10);
    }

    #[test]
    fn test_convenience_wrappers() {
        let a = spd_4x4();
        let m = BlockMatrix::from_dense(&a, &[2, 1]).unwrap();
        let b = vec![1.0, 0.0, -1.0, 2.0];
        let mut x = b.clone();
        let chol = solve_bds(m.clone(), &mut x, TOL).unwrap();
        assert_eq!(chol.singular_count(), 0);
        assert_eq!(chol.tolerance(), TOL);
        assert_eq!(chol.n(), 4);
        let ax = a.mat_vec(&x);
        for i in 0..4 {
            assert!((ax[i] - b[i]).abs() < 1e-10);
        }
        let inv = inverse_bds(m, TOL).unwrap();
        assert!(a.mat_mul(&inv).max_abs_diff(&DenseMatrix::identity(4)) < 1e-10);
    }

    #[test]
    fn test_refactorization_is_deterministic() {
        let a = DenseMatrix::from_row_major(
            3,
            3,
            &[2.0, 1.0, 1.0, 1.0, 2.0, 1.0, 1.0, 1.0, 2.0],
        );
        let m = BlockMatrix::from_dense(&a, &[3]).unwrap();
        let c1 = BlockCholesky::factorize(m.clone(), TOL).unwrap();
        let c2 = BlockCholesky::factorize(m, TOL).unwrap();
        for j in 0..3 {
            assert_eq!(c1.is_singular(j), c2.is_singular(j));
            for i in j..3 {
                assert_eq!(c1.factor().get(i, j), c2.factor().get(i, j));
            }
        }
    }
}
