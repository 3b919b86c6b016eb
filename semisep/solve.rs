//! Solves `K x = y` against a factorization `K = L D L^T`.
//!
//! Forward substitution with `L`, a diagonal scale by `D^{-1}`, then backward
//! substitution with `L^T`. Each substitution carries a `J x Nrhs` running
//! sum. The gradient variant records that running sum at every row, before the
//! propagator is applied, so that [`solve_grad`] can replay the sweeps in
//! reverse without keeping every intermediate `Z`.

use crate::blocks::{RowBlocks, add_outer, scale_rows};
use ndarray::linalg::general_mat_vec_mul;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

/// Snapshots of the two substitution sweeps, `N` blocks of `J x Nrhs` each.
///
/// `f` row `n` is the forward running sum after adding `W[n-1]^T Z[n-1]`;
/// `g` row `n` is the backward running sum after adding `U[n+1]^T Z[n+1]`.
/// `f` row 0 and `g` row `N-1` are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveState {
    pub f: RowBlocks,
    pub g: RowBlocks,
}

/// Adjoints produced by [`solve_grad`].
#[derive(Debug, Clone, PartialEq)]
pub struct SolveGradient {
    pub u: Array2<f64>,
    pub p: Array2<f64>,
    pub d: Array1<f64>,
    pub w: Array2<f64>,
    /// Adjoint of the right-hand side, net of the pass-through term: the
    /// total adjoint of `y` is `y + bz`.
    pub y: Array2<f64>,
}

/// Solves in place: `z` holds `y` on entry and `K^{-1} y` on return.
pub fn solve(
    u: ArrayView2<'_, f64>,
    p: ArrayView2<'_, f64>,
    d: ArrayView1<'_, f64>,
    w: ArrayView2<'_, f64>,
    z: ArrayViewMut2<'_, f64>,
) {
    solve_rows(u, p, d, w, z, None);
}

/// Same as [`solve`], also returning the sweep snapshots for [`solve_grad`].
pub fn solve_with_state(
    u: ArrayView2<'_, f64>,
    p: ArrayView2<'_, f64>,
    d: ArrayView1<'_, f64>,
    w: ArrayView2<'_, f64>,
    z: ArrayViewMut2<'_, f64>,
) -> SolveState {
    let (n_rows, rank) = u.dim();
    let nrhs = z.ncols();
    let mut state = SolveState {
        f: RowBlocks::zeros(n_rows, rank, nrhs),
        g: RowBlocks::zeros(n_rows, rank, nrhs),
    };
    solve_rows(u, p, d, w, z, Some(&mut state));
    state
}

fn solve_rows(
    u: ArrayView2<'_, f64>,
    p: ArrayView2<'_, f64>,
    d: ArrayView1<'_, f64>,
    w: ArrayView2<'_, f64>,
    mut z: ArrayViewMut2<'_, f64>,
    mut saved: Option<&mut SolveState>,
) {
    let (n_rows, rank) = u.dim();
    let nrhs = z.ncols();
    debug_assert_eq!(z.nrows(), n_rows);
    if n_rows == 0 {
        return;
    }
    let mut f = Array2::<f64>::zeros((rank, nrhs));

    // Forward substitution with L.
    for n in 1..n_rows {
        add_outer(&mut f, 1.0, w.row(n - 1), z.row(n - 1));
        if let Some(state) = saved.as_deref_mut() {
            state.f.store(n, f.view());
        }
        scale_rows(&mut f, p.row(n - 1));
        general_mat_vec_mul(-1.0, &f.t(), &u.row(n), 1.0, &mut z.row_mut(n));
    }

    // Pivots.
    for (mut row, &dn) in z.outer_iter_mut().zip(d.iter()) {
        row /= dn;
    }

    // Back substitution with L^T.
    f.fill(0.0);
    for n in (0..n_rows - 1).rev() {
        add_outer(&mut f, 1.0, u.row(n + 1), z.row(n + 1));
        if let Some(state) = saved.as_deref_mut() {
            state.g.store(n, f.view());
        }
        scale_rows(&mut f, p.row(n));
        general_mat_vec_mul(-1.0, &f.t(), &w.row(n), 1.0, &mut z.row_mut(n));
    }
}

/// Reverse-mode gradient of [`solve_with_state`].
///
/// `z` is the solution returned by the paired forward call and `state` its
/// snapshots; `bz` is the adjoint of `z`. The intermediate solution vectors
/// are rebuilt row by row from `z` and the snapshots while the adjoints are
/// accumulated, so only a single `N x Nrhs` work buffer is allocated.
///
/// All five outputs are overwritten. `by` is returned net of the pass-through
/// term, i.e. the full adjoint of the right-hand side is `by + bz`.
#[allow(clippy::too_many_arguments)]
pub fn solve_grad(
    u: ArrayView2<'_, f64>,
    p: ArrayView2<'_, f64>,
    d: ArrayView1<'_, f64>,
    w: ArrayView2<'_, f64>,
    z: ArrayView2<'_, f64>,
    state: &SolveState,
    bz: ArrayView2<'_, f64>,
    mut bu: ArrayViewMut2<'_, f64>,
    mut bp: ArrayViewMut2<'_, f64>,
    mut bd: ArrayViewMut1<'_, f64>,
    mut bw: ArrayViewMut2<'_, f64>,
    mut by: ArrayViewMut2<'_, f64>,
) {
    let (n_rows, rank) = u.dim();
    let nrhs = z.ncols();
    debug_assert_eq!(state.f.block_shape(), (rank, nrhs));
    if n_rows == 0 {
        return;
    }

    let mut zw = z.to_owned();
    let mut snapshot = Array2::<f64>::zeros((rank, nrhs));
    let mut scaled = Array2::<f64>::zeros((rank, nrhs));
    let mut bf = Array2::<f64>::zeros((rank, nrhs));

    bu.row_mut(0).fill(0.0);
    by.assign(&bz);

    // Undo L^{-T}, ascending.
    for n in 0..n_rows - 1 {
        state.g.load_into(n, &mut snapshot);
        scaled.assign(&snapshot);
        scale_rows(&mut scaled, p.row(n));

        // Z[n] -= W[n] diag(P[n]) G
        general_mat_vec_mul(-1.0, &scaled, &by.row(n), 0.0, &mut bw.row_mut(n));
        add_outer(&mut bf, -1.0, w.row(n), by.row(n));
        general_mat_vec_mul(1.0, &scaled.t(), &w.row(n), 1.0, &mut zw.row_mut(n));

        // G = diag(P[n]) G
        for j in 0..rank {
            bp[[n, j]] = snapshot.row(j).dot(&bf.row(j));
        }
        scale_rows(&mut bf, p.row(n));

        // G += U[n+1]^T Z[n+1]
        general_mat_vec_mul(1.0, &bf, &zw.row(n + 1), 0.0, &mut bu.row_mut(n + 1));
        general_mat_vec_mul(1.0, &bf.t(), &u.row(n + 1), 1.0, &mut by.row_mut(n + 1));
    }
    bw.row_mut(n_rows - 1).fill(0.0);

    // Undo D^{-1}.
    for (((mut byn, mut zn), bdn), &dn) in by
        .outer_iter_mut()
        .zip(zw.outer_iter_mut())
        .zip(bd.iter_mut())
        .zip(d.iter())
    {
        byn /= dn;
        *bdn = -zn.dot(&byn);
        zn *= dn;
    }

    // Undo L^{-1}, descending.
    bf.fill(0.0);
    for n in (1..n_rows).rev() {
        state.f.load_into(n, &mut snapshot);
        scaled.assign(&snapshot);
        scale_rows(&mut scaled, p.row(n - 1));

        // Z[n] -= U[n] diag(P[n-1]) F
        general_mat_vec_mul(-1.0, &scaled, &by.row(n), 1.0, &mut bu.row_mut(n));
        add_outer(&mut bf, -1.0, u.row(n), by.row(n));

        // F = diag(P[n-1]) F
        for j in 0..rank {
            bp[[n - 1, j]] += snapshot.row(j).dot(&bf.row(j));
        }
        scale_rows(&mut bf, p.row(n - 1));

        // F += W[n-1]^T Z[n-1]
        general_mat_vec_mul(1.0, &bf, &zw.row(n - 1), 1.0, &mut bw.row_mut(n - 1));
        general_mat_vec_mul(1.0, &bf.t(), &w.row(n - 1), 1.0, &mut by.row_mut(n - 1));
    }

    by -= &bz;
}
