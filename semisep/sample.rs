use crate::blocks::{add_outer, scale_rows};
use ndarray::linalg::general_mat_vec_mul;
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut2};

/// Applies the square-root factor `L D^{1/2}` in place.
///
/// `z` holds `y` on entry. If the columns of `y` are independent standard
/// normal draws, the columns of the result are draws with covariance
/// `K = L D L^T`. A single forward sweep, O(N J Nrhs).
pub fn dot_tril(
    u: ArrayView2<'_, f64>,
    p: ArrayView2<'_, f64>,
    d: ArrayView1<'_, f64>,
    w: ArrayView2<'_, f64>,
    mut z: ArrayViewMut2<'_, f64>,
) {
    let (n_rows, rank) = u.dim();
    let nrhs = z.ncols();
    debug_assert_eq!(z.nrows(), n_rows);
    if n_rows == 0 {
        return;
    }

    let mut f = Array2::<f64>::zeros((rank, nrhs));
    let mut z0 = z.row_mut(0);
    z0 *= d[0].sqrt();
    // Row n-1 of D^{1/2} y, the quantity L mixes into later rows.
    let mut scaled = z.row(0).to_owned();

    for n in 1..n_rows {
        add_outer(&mut f, 1.0, w.row(n - 1), scaled.view());
        scale_rows(&mut f, p.row(n - 1));

        let mut zn = z.row_mut(n);
        zn *= d[n].sqrt();
        scaled.assign(&zn);
        general_mat_vec_mul(1.0, &f.t(), &u.row(n), 1.0, &mut zn);
    }
}
