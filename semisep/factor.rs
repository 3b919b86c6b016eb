//! # `K = L D L^T` for semiseparable matrices
//!
//! The unit lower-triangular factor `L` shares the semiseparable structure of
//! `K`: its strictly lower part is `(U, W, P)` with `W` playing the role of
//! `V`. The factorization therefore only produces the pivots `d` and the
//! `N x J` matrix `W`, overwriting copies of `a` and `V` respectively.
//!
//! Per row `n >= 1` a running `J x J` state is propagated:
//!
//! ```text
//! S    = diag(P[n-1]) (S + d[n-1] W[n-1]^T W[n-1]) diag(P[n-1])
//! d[n] = a[n] - U[n] S U[n]^T
//! W[n] = (V[n] - U[n] S) / d[n]
//! ```
//!
//! The gradient variant keeps one snapshot of `S` per row. The snapshot is
//! taken after the left multiplication by `diag(P[n-1])` and before the right
//! one; [`factor_grad`] is written against exactly that half-propagated value.

use crate::blocks::{RowBlocks, add_outer, scale_cols, scale_rows};
use crate::matrix::SemiseparableMatrix;
use crate::sample;
use crate::solve::{self, SolveGradient, SolveState};
use ndarray::linalg::general_mat_vec_mul;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FactorError {
    /// Pivot `row` came out non-positive. Rows before it hold valid values;
    /// rows from `row` onward are left in an unspecified state.
    #[error(
        "Matrix is not positive definite: pivot at row {row} is {pivot:.6e}, which is not strictly positive."
    )]
    NotPositiveDefinite { row: usize, pivot: f64 },
}

impl FactorError {
    /// Index of the row whose pivot failed. Always at least 1, since the
    /// first pivot is `a[0]` itself and is not checked.
    pub fn row(&self) -> usize {
        match self {
            Self::NotPositiveDefinite { row, .. } => *row,
        }
    }
}

/// Per-row snapshots of the factorization state, `N` blocks of `J x J`.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorState {
    pub s: RowBlocks,
}

/// Factorizes in place. On entry `d` holds `a` and `w` holds `V`; on success
/// they hold the pivots and `W`.
pub fn factor(
    u: ArrayView2<'_, f64>,
    p: ArrayView2<'_, f64>,
    d: ArrayViewMut1<'_, f64>,
    w: ArrayViewMut2<'_, f64>,
) -> Result<(), FactorError> {
    factor_rows(u, p, d, w, None)
}

/// Same as [`factor`], additionally returning the snapshots consumed by
/// [`factor_grad`]. Costs O(N J^2) extra memory.
pub fn factor_with_state(
    u: ArrayView2<'_, f64>,
    p: ArrayView2<'_, f64>,
    d: ArrayViewMut1<'_, f64>,
    w: ArrayViewMut2<'_, f64>,
) -> Result<FactorState, FactorError> {
    let (n_rows, rank) = u.dim();
    let mut s = RowBlocks::zeros(n_rows, rank, rank);
    factor_rows(u, p, d, w, Some(&mut s))?;
    Ok(FactorState { s })
}

fn factor_rows(
    u: ArrayView2<'_, f64>,
    p: ArrayView2<'_, f64>,
    mut d: ArrayViewMut1<'_, f64>,
    mut w: ArrayViewMut2<'_, f64>,
    mut saved: Option<&mut RowBlocks>,
) -> Result<(), FactorError> {
    let (n_rows, rank) = u.dim();
    debug_assert_eq!(d.len(), n_rows);
    debug_assert_eq!(w.dim(), (n_rows, rank));
    if n_rows == 0 {
        return Ok(());
    }

    let mut s = Array2::<f64>::zeros((rank, rank));
    let mut tmp = Array1::<f64>::zeros(rank);

    let d0 = d[0];
    let mut w0 = w.row_mut(0);
    w0 /= d0;

    for n in 1..n_rows {
        let prev = n - 1;
        add_outer(&mut s, d[prev], w.row(prev), w.row(prev));
        scale_rows(&mut s, p.row(prev));
        if let Some(blocks) = saved.as_deref_mut() {
            blocks.store(n, s.view());
        }
        scale_cols(&mut s, p.row(prev));

        // tmp = U[n] S
        let un = u.row(n);
        general_mat_vec_mul(1.0, &s.t(), &un, 0.0, &mut tmp);
        d[n] -= tmp.dot(&un);
        let dn = d[n];
        if dn <= 0.0 {
            return Err(FactorError::NotPositiveDefinite { row: n, pivot: dn });
        }

        let mut wn = w.row_mut(n);
        wn -= &tmp;
        wn /= dn;
    }
    Ok(())
}

/// Reverse-mode gradient of [`factor_with_state`].
///
/// `u`, `p`, `d`, `w` and `state` must be exactly the inputs and outputs of
/// the paired forward call. On entry `ba` holds the adjoint of `d` and `bv`
/// the adjoint of `W`; on return they hold the adjoints of `a` and `V`.
/// `bu` (`N x J`) and `bp` (`N-1 x J`) are overwritten.
#[allow(clippy::too_many_arguments)]
pub fn factor_grad(
    u: ArrayView2<'_, f64>,
    p: ArrayView2<'_, f64>,
    d: ArrayView1<'_, f64>,
    w: ArrayView2<'_, f64>,
    state: &FactorState,
    mut bu: ArrayViewMut2<'_, f64>,
    mut bp: ArrayViewMut2<'_, f64>,
    mut ba: ArrayViewMut1<'_, f64>,
    mut bv: ArrayViewMut2<'_, f64>,
) {
    let (n_rows, rank) = u.dim();
    debug_assert_eq!(state.s.len(), n_rows);
    if n_rows == 0 {
        return;
    }

    let mut sn = Array2::<f64>::zeros((rank, rank));
    let mut bs = Array2::<f64>::zeros((rank, rank));
    let mut g = Array1::<f64>::zeros(rank);

    // W = (V - U S) / d, so the incoming adjoint of W becomes the adjoint of
    // the numerator once divided through by the pivot.
    for (mut row, &dn) in bv.outer_iter_mut().zip(d.iter()) {
        row /= dn;
    }

    for n in (1..n_rows).rev() {
        state.s.load_into(n, &mut sn);
        let un = u.row(n);
        let pn = p.row(n - 1);

        // Adjoints through the pivot and the W row.
        ba[n] -= w.row(n).dot(&bv.row(n));
        let ban = ba[n];

        g.assign(&bv.row(n));
        g.scaled_add(2.0 * ban, &un);
        let mut bun = bu.row_mut(n);
        general_mat_vec_mul(-1.0, &sn.t(), &g, 0.0, &mut bun);
        bun *= &pn;

        g.assign(&bv.row(n));
        g.scaled_add(ban, &un);
        add_outer(&mut bs, -1.0, un, g.view());

        // Propagator: bP = diag(bS S + S^T bS).
        for j in 0..rank {
            let mut acc = 0.0;
            for k in 0..rank {
                acc += bs[[j, k]] * sn[[k, j]] + sn[[k, j]] * bs[[k, j]];
            }
            bp[[n - 1, j]] = acc;
        }

        // Accumulation of d[n-1] W[n-1]^T W[n-1] into S.
        scale_rows(&mut bs, pn);
        scale_cols(&mut bs, pn);
        let wp = w.row(n - 1);
        ba[n - 1] += wp.dot(&bs.dot(&wp));
        let mut bvp = bv.row_mut(n - 1);
        general_mat_vec_mul(1.0, &bs.t(), &wp, 1.0, &mut bvp);
        general_mat_vec_mul(1.0, &bs, &wp, 1.0, &mut bvp);
    }

    bu.row_mut(0).fill(0.0);
    ba[0] -= bv.row(0).dot(&w.row(0));
}

/// Adjoints produced by [`Factorization::factor_grad`].
#[derive(Debug, Clone, PartialEq)]
pub struct FactorGradient {
    /// Adjoint of the diagonal `a`.
    pub a: Array1<f64>,
    pub u: Array2<f64>,
    pub v: Array2<f64>,
    pub p: Array2<f64>,
}

/// A successful factorization of a [`SemiseparableMatrix`].
///
/// Borrows the matrix it came from, since every downstream kernel also needs
/// its `U` and `P`.
#[derive(Debug, Clone)]
pub struct Factorization<'a> {
    matrix: &'a SemiseparableMatrix,
    d: Array1<f64>,
    w: Array2<f64>,
}

impl<'a> Factorization<'a> {
    pub(crate) fn from_parts(matrix: &'a SemiseparableMatrix, d: Array1<f64>, w: Array2<f64>) -> Self {
        Self { matrix, d, w }
    }

    pub fn matrix(&self) -> &'a SemiseparableMatrix {
        self.matrix
    }

    /// Pivots `d`, the diagonal of `D`.
    pub fn pivots(&self) -> ArrayView1<'_, f64> {
        self.d.view()
    }

    /// The `W` factor of `L`.
    pub fn weights(&self) -> ArrayView2<'_, f64> {
        self.w.view()
    }

    /// `log det K = sum_n ln d[n]`.
    pub fn log_det(&self) -> f64 {
        self.d.iter().map(|d| d.ln()).sum()
    }

    /// Solves `K x = y` for an `(N, Nrhs)` right-hand side.
    pub fn solve(&self, y: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut z = y.to_owned();
        solve::solve(
            self.matrix.left(),
            self.matrix.propagator(),
            self.d.view(),
            self.w.view(),
            z.view_mut(),
        );
        z
    }

    /// Solves and keeps the sweep snapshots for [`Factorization::solve_grad`].
    pub fn solve_with_state(&self, y: ArrayView2<'_, f64>) -> (Array2<f64>, SolveState) {
        let mut z = y.to_owned();
        let state = solve::solve_with_state(
            self.matrix.left(),
            self.matrix.propagator(),
            self.d.view(),
            self.w.view(),
            z.view_mut(),
        );
        (z, state)
    }

    /// Adjoints of a solve given the adjoint `bz` of its result `z`.
    pub fn solve_grad(
        &self,
        z: ArrayView2<'_, f64>,
        state: &SolveState,
        bz: ArrayView2<'_, f64>,
    ) -> SolveGradient {
        let (n_rows, rank) = self.w.dim();
        let mut grad = SolveGradient {
            u: Array2::zeros((n_rows, rank)),
            p: Array2::zeros((n_rows.saturating_sub(1), rank)),
            d: Array1::zeros(n_rows),
            w: Array2::zeros((n_rows, rank)),
            y: Array2::zeros(z.dim()),
        };
        solve::solve_grad(
            self.matrix.left(),
            self.matrix.propagator(),
            self.d.view(),
            self.w.view(),
            z,
            state,
            bz,
            grad.u.view_mut(),
            grad.p.view_mut(),
            grad.d.view_mut(),
            grad.w.view_mut(),
            grad.y.view_mut(),
        );
        grad
    }

    /// Adjoints of `(a, U, V, P)` given the adjoints of the pivots and of `W`.
    pub fn factor_grad(
        &self,
        state: &FactorState,
        bd: ArrayView1<'_, f64>,
        bw: ArrayView2<'_, f64>,
    ) -> FactorGradient {
        let (n_rows, rank) = self.w.dim();
        let mut grad = FactorGradient {
            a: bd.to_owned(),
            u: Array2::zeros((n_rows, rank)),
            v: bw.to_owned(),
            p: Array2::zeros((n_rows.saturating_sub(1), rank)),
        };
        factor_grad(
            self.matrix.left(),
            self.matrix.propagator(),
            self.d.view(),
            self.w.view(),
            state,
            grad.u.view_mut(),
            grad.p.view_mut(),
            grad.a.view_mut(),
            grad.v.view_mut(),
        );
        grad
    }

    /// Applies `L D^{1/2}` to `y`. With standard-normal columns in `y` the
    /// result has covariance `K`.
    pub fn dot_tril(&self, y: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut z = y.to_owned();
        sample::dot_tril(
            self.matrix.left(),
            self.matrix.propagator(),
            self.d.view(),
            self.w.view(),
            z.view_mut(),
        );
        z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::kernel_matrix;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn worked_example() -> SemiseparableMatrix {
        SemiseparableMatrix::new(
            array![1.0, 1.0, 1.0],
            array![[1.0], [1.0], [1.0]],
            array![[1.0], [1.0], [1.0]],
            array![[0.5], [0.5]],
        )
        .unwrap()
    }

    #[test]
    fn test_worked_example_pivots_and_weights() {
        let k = worked_example();
        let factorization = k.factor().unwrap();
        let d = factorization.pivots();
        let w = factorization.weights();
        assert_abs_diff_eq!(d[0], 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(d[1], 0.75, epsilon = 1e-14);
        assert_abs_diff_eq!(d[2], 0.75, epsilon = 1e-14);
        // L[1][0] = L[2][1] = 0.5 and L[2][0] = 0, so every W row is 1.
        assert_abs_diff_eq!(w[[0, 0]], 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(w[[1, 0]], 1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(w[[2, 0]], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_reconstructs_dense_matrix() {
        // L D L^T with L[n][m] = U[n] . (W[m] * prod P) must give back K.
        let k = kernel_matrix(9, 3);
        let dense = k.to_dense();
        let factorization = k.factor().unwrap();
        let n = k.len();
        let zero_diag = Array1::zeros(n);
        let mut lower = crate::dense::to_dense(
            zero_diag.view(),
            k.left(),
            factorization.weights(),
            k.propagator(),
        );
        for i in 0..n {
            for j in (i + 1)..n {
                lower[[i, j]] = 0.0;
            }
            lower[[i, i]] = 1.0;
        }
        let ld = &lower * &factorization.pivots();
        let rebuilt = ld.dot(&lower.t());
        for (got, want) in rebuilt.iter().zip(dense.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_state_variant_agrees_with_plain_variant() {
        let k = kernel_matrix(11, 7);
        let plain = k.factor().unwrap();
        let (with_state, state) = k.factor_with_state().unwrap();
        assert_eq!(plain.pivots(), with_state.pivots());
        for (a, b) in plain.weights().iter().zip(with_state.weights().iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-14);
        }
        assert_eq!(state.s.len(), k.len());
        assert_eq!(state.s.block_shape(), (k.rank(), k.rank()));
        assert!(state.s.as_flat().row(0).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_saved_state_is_half_propagated() {
        // Row 1 snapshot is diag(P[0]) * d[0] W[0]^T W[0].
        let k = worked_example();
        let (factorization, state) = k.factor_with_state().unwrap();
        let d0 = factorization.pivots()[0];
        let w0 = factorization.weights()[[0, 0]];
        assert_abs_diff_eq!(state.s.block(1)[[0, 0]], 0.5 * d0 * w0 * w0, epsilon = 1e-15);
    }

    #[test]
    fn test_reports_first_non_positive_pivot() {
        // K = [[1, 1, .], [1, 1, .], ...] is singular at row 1.
        let k = SemiseparableMatrix::new(
            array![1.0, 1.0, 1.0, 1.0],
            array![[1.0], [1.0], [1.0], [1.0]],
            array![[1.0], [1.0], [1.0], [1.0]],
            array![[1.0], [0.5], [0.5]],
        )
        .unwrap();
        let err = k.factor().unwrap_err();
        assert_eq!(err.row(), 1);
        match err {
            FactorError::NotPositiveDefinite { pivot, .. } => assert!(pivot <= 0.0),
        }
    }

    #[test]
    fn test_failure_keeps_earlier_rows() {
        // Rows 0..3 come from a valid matrix; row 3 has a diagonal too small
        // to stay positive.
        let valid = kernel_matrix(6, 11);
        let mut a = valid.diag().to_owned();
        a[3] = 1e-6;
        let broken = SemiseparableMatrix::new(
            a.clone(),
            valid.left().to_owned(),
            valid.right().to_owned(),
            valid.propagator().to_owned(),
        )
        .unwrap();

        let reference = valid.factor().unwrap();
        let mut d = a;
        let mut w = broken.right().to_owned();
        let err = factor(broken.left(), broken.propagator(), d.view_mut(), w.view_mut())
            .unwrap_err();
        assert_eq!(err.row(), 3);
        for n in 0..3 {
            assert_abs_diff_eq!(d[n], reference.pivots()[n], epsilon = 1e-14);
            for j in 0..broken.rank() {
                assert_abs_diff_eq!(w[[n, j]], reference.weights()[[n, j]], epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn test_log_det_matches_worked_example() {
        let k = worked_example();
        let factorization = k.factor().unwrap();
        // det K = 1 * 0.75 * 0.75
        assert_abs_diff_eq!(factorization.log_det(), 0.5625f64.ln(), epsilon = 1e-14);
    }
}
