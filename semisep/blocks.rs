//! Per-row small-matrix storage and the row-level updates shared by the
//! recurrences.
//!
//! The factorization saves one `J x J` block per row and the solve saves one
//! `J x Nrhs` block per row and sweep. Both are kept as a single `(N, r*c)`
//! array rather than a `Vec` of matrices so that the snapshots are one
//! contiguous allocation that callers can hand around as plain ndarray data.

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// `N` row-wise flattened `rows x cols` blocks.
///
/// Block `n` occupies row `n` of the backing array. Inside that row the block
/// is stored column-major: element `(r, c)` lives at flat index
/// `c * rows + r`. The gradient kernels read the snapshots back with the same
/// mapping, so the layout is part of the contract between a forward call and
/// its paired backward call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowBlocks {
    data: Array2<f64>,
    rows: usize,
    cols: usize,
}

impl RowBlocks {
    /// Allocates `len` zeroed blocks of shape `rows x cols`.
    pub fn zeros(len: usize, rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::zeros((len, rows * cols)),
            rows,
            cols,
        }
    }

    /// Number of stored blocks (one per matrix row).
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    /// Shape `(rows, cols)` of each block.
    pub fn block_shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// The flat `(N, rows * cols)` backing array.
    pub fn as_flat(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Returns an owned copy of block `n`.
    pub fn block(&self, n: usize) -> Array2<f64> {
        let mut out = Array2::zeros((self.rows, self.cols));
        self.load_into(n, &mut out);
        out
    }

    /// Writes `block` into row `n`.
    pub(crate) fn store(&mut self, n: usize, block: ArrayView2<'_, f64>) {
        debug_assert_eq!(block.dim(), (self.rows, self.cols));
        let rows = self.rows;
        let mut flat = self.data.row_mut(n);
        for c in 0..self.cols {
            for r in 0..rows {
                flat[c * rows + r] = block[[r, c]];
            }
        }
    }

    /// Reads row `n` back into `block`, the inverse of [`RowBlocks::store`].
    pub(crate) fn load_into(&self, n: usize, block: &mut Array2<f64>) {
        debug_assert_eq!(block.dim(), (self.rows, self.cols));
        let rows = self.rows;
        let flat = self.data.row(n);
        for c in 0..self.cols {
            for r in 0..rows {
                block[[r, c]] = flat[c * rows + r];
            }
        }
    }
}

/// `target += scale * left^T right`, with `left` indexing rows of `target`.
#[inline]
pub(crate) fn add_outer(
    target: &mut Array2<f64>,
    scale: f64,
    left: ArrayView1<'_, f64>,
    right: ArrayView1<'_, f64>,
) {
    for (mut row, &l) in target.outer_iter_mut().zip(left.iter()) {
        row.scaled_add(scale * l, &right);
    }
}

/// `target = diag(factors) * target`.
#[inline]
pub(crate) fn scale_rows(target: &mut Array2<f64>, factors: ArrayView1<'_, f64>) {
    for (mut row, &s) in target.outer_iter_mut().zip(factors.iter()) {
        row *= s;
    }
}

/// `target = target * diag(factors)`.
#[inline]
pub(crate) fn scale_cols(target: &mut Array2<f64>, factors: ArrayView1<'_, f64>) {
    for mut row in target.outer_iter_mut() {
        row *= &factors;
    }
}
