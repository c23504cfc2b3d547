#![allow(clippy::needless_range_loop)]
//! Bordered block-diagonal symmetric matrix storage.
//!
//! An n x n symmetric matrix is kept as a sequence of dense diagonal
//! blocks (packed lower triangles) followed by a dense border: the
//! trailing r = n - sum(block sizes) columns stored in full. Entries
//! outside the blocks and the border are structurally zero. Only the
//! lower triangle is meaningful; reads honor symmetry.

use crate::dense::DenseMatrix;
use crate::error::LinalgError;

/// A symmetric matrix in bordered block-diagonal form.
///
/// The layout matches the bdsmatrix class of the R survival-analysis
/// ecosystem: `blocks` holds each diagonal block's lower triangle packed
/// column-wise, and `border` holds the trailing columns at full height
/// (its bottom r x r square is the dense corner of the matrix, lower
/// triangle meaningful).
#[derive(Debug, Clone)]
pub struct BlockMatrix {
    n: usize,
    block_sizes: Vec<usize>,
    /// Global row at which each block starts.
    block_starts: Vec<usize>,
    /// Offset of each block's packed triangle within `blocks`.
    block_offsets: Vec<usize>,
    /// Packed lower triangles of the diagonal blocks.
    blocks: Vec<f64>,
    /// Trailing dense columns, n rows by r.
    border: DenseMatrix,
}

impl BlockMatrix {
    /// A zero matrix with the given dimension and diagonal block sizes.
    ///
    /// Block sizes must be positive and sum to at most `n`; the
    /// remaining `n - sum` trailing rows/columns form the dense border.
    pub fn new(n: usize, block_sizes: &[usize]) -> Result<Self, LinalgError> {
        let mut sum = 0usize;
        let mut block_starts = Vec::with_capacity(block_sizes.len());
        let mut block_offsets = Vec::with_capacity(block_sizes.len());
        let mut packed_len = 0usize;
        for (index, &size) in block_sizes.iter().enumerate() {
            if size == 0 {
                return Err(LinalgError::ZeroBlockSize { index });
            }
            block_starts.push(sum);
            block_offsets.push(packed_len);
            sum += size;
            packed_len += size * (size + 1) / 2;
        }
        if sum > n {
            return Err(LinalgError::BlockSizeOverflow { sum, n });
        }
        Ok(Self {
            n,
            block_sizes: block_sizes.to_vec(),
            block_starts,
            block_offsets,
            blocks: vec![0.0; packed_len],
            border: DenseMatrix::zeros(n, n - sum),
        })
    }

    /// Build from a dense symmetric matrix, reading its lower triangle.
    ///
    /// Lower-triangle entries outside the block pattern are ignored; the
    /// caller asserts they are zero or negligible by choosing this
    /// storage.
    pub fn from_dense(a: &DenseMatrix, block_sizes: &[usize]) -> Result<Self, LinalgError> {
        if a.nrows() != a.ncols() {
            return Err(LinalgError::DimensionMismatch {
                expected: a.nrows(),
                got: a.ncols(),
            });
        }
        let mut m = Self::new(a.nrows(), block_sizes)?;
        let nb = m.block_dim();
        for (b, &size) in m.block_sizes.clone().iter().enumerate() {
            let s = m.block_starts[b];
            for j in s..s + size {
                for i in j..s + size {
                    m.set(i, j, a.get(i, j));
                }
            }
        }
        for j in nb..m.n {
            for i in j..m.n {
                m.set(i, j, a.get(i, j));
            }
            // Cross entries above the corner, stored in the border rows.
            for i in 0..nb {
                m.set(j, i, a.get(j, i));
            }
        }
        Ok(m)
    }

    /// A zero matrix with the same dimension and block structure.
    pub fn same_pattern(&self) -> BlockMatrix {
        BlockMatrix {
            n: self.n,
            block_sizes: self.block_sizes.clone(),
            block_starts: self.block_starts.clone(),
            block_offsets: self.block_offsets.clone(),
            blocks: vec![0.0; self.blocks.len()],
            border: DenseMatrix::zeros(self.n, self.border.ncols()),
        }
    }

    /// Matrix dimension n.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Diagonal block sizes, in order.
    pub fn block_sizes(&self) -> &[usize] {
        &self.block_sizes
    }

    /// Number of diagonal blocks.
    pub fn nblocks(&self) -> usize {
        self.block_sizes.len()
    }

    /// Dimension covered by the diagonal blocks (sum of block sizes).
    pub fn block_dim(&self) -> usize {
        self.n - self.border.ncols()
    }

    /// Width of the dense border, r = n - block_dim.
    pub fn border_dim(&self) -> usize {
        self.border.ncols()
    }

    /// Global row at which block `b` starts.
    pub(crate) fn block_start(&self, b: usize) -> usize {
        self.block_starts[b]
    }

    /// Index of the block containing global row `i` (i < block_dim).
    fn block_of(&self, i: usize) -> usize {
        self.block_starts.partition_point(|&s| s <= i) - 1
    }

    /// Position of entry (i, j) within the packed triangle of block `b`,
    /// for i >= j, both inside the block. Column lj is preceded by
    /// m + (m-1) + ... + (m-lj+1) = lj*(2m - lj + 1)/2 packed entries.
    fn packed_index(&self, b: usize, i: usize, j: usize) -> usize {
        let s = self.block_starts[b];
        let m = self.block_sizes[b];
        let (li, lj) = (i - s, j - s);
        self.block_offsets[b] + lj * (2 * m - lj + 1) / 2 + (li - lj)
    }

    /// Element at (i, j), honoring symmetry. Entries outside the stored
    /// pattern read as zero.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.n && j < self.n);
        let (i, j) = if i >= j { (i, j) } else { (j, i) };
        let nb = self.block_dim();
        if j >= nb {
            self.border.get(i, j - nb)
        } else if i >= nb {
            self.border.get(j, i - nb)
        } else {
            let b = self.block_of(i);
            if j >= self.block_starts[b] {
                self.blocks[self.packed_index(b, i, j)]
            } else {
                0.0
            }
        }
    }

    /// Overwrite the element at (i, j), honoring symmetry.
    ///
    /// Writing a non-zero value outside the stored pattern is a
    /// programming error and panics.
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        assert!(i < self.n && j < self.n);
        let (i, j) = if i >= j { (i, j) } else { (j, i) };
        let nb = self.block_dim();
        if j >= nb {
            self.border.set(i, j - nb, value);
        } else if i >= nb {
            self.border.set(j, i - nb, value);
        } else {
            let b = self.block_of(i);
            if j >= self.block_starts[b] {
                let idx = self.packed_index(b, i, j);
                self.blocks[idx] = value;
            } else {
                assert!(value == 0.0, "write of {value} outside the block pattern");
            }
        }
    }

    /// Matrix-vector product y = A * x, exploiting the block pattern.
    pub fn mat_vec(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.n);
        let nb = self.block_dim();
        let mut y = vec![0.0; self.n];
        for b in 0..self.nblocks() {
            let s = self.block_starts[b];
            let e = s + self.block_sizes[b];
            for j in s..e {
                y[j] += self.get(j, j) * x[j];
                for i in j + 1..e {
                    let v = self.get(i, j);
                    y[i] += v * x[j];
                    y[j] += v * x[i];
                }
            }
        }
        for j in nb..self.n {
            // Cross entries against every block row, then the corner.
            for i in 0..nb {
                let v = self.border.get(i, j - nb);
                y[i] += v * x[j];
                y[j] += v * x[i];
            }
            y[j] += self.get(j, j) * x[j];
            for i in j + 1..self.n {
                let v = self.get(i, j);
                y[i] += v * x[j];
                y[j] += v * x[i];
            }
        }
        y
    }

    /// Matrix product A * Y for a dense multi-column Y.
    pub fn mat_mul_dense(&self, y: &DenseMatrix) -> DenseMatrix {
        assert_eq!(y.nrows(), self.n);
        let mut result = DenseMatrix::zeros(self.n, y.ncols());
        for c in 0..y.ncols() {
            result.set_col(c, &self.mat_vec(&y.col(c)));
        }
        result
    }

    /// Expand to full dense storage.
    pub fn to_dense(&self) -> DenseMatrix {
        let mut a = DenseMatrix::zeros(self.n, self.n);
        for j in 0..self.n {
            for i in j..self.n {
                let v = self.get(i, j);
                a.set(i, j, v);
                a.set(j, i, v);
            }
        }
        a
    }
}
