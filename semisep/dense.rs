use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Expands `(a, U, V, P)` into the explicit symmetric `N x N` matrix.
///
/// Column `m` is built by carrying the running product of propagator rows
/// downwards, so the cost is O(N^2 J). Intended for tests and small problems.
pub fn to_dense(
    a: ArrayView1<'_, f64>,
    u: ArrayView2<'_, f64>,
    v: ArrayView2<'_, f64>,
    p: ArrayView2<'_, f64>,
) -> Array2<f64> {
    let (n_rows, rank) = u.dim();
    let mut k = Array2::zeros((n_rows, n_rows));
    let mut decay = Array1::<f64>::ones(rank);

    for m in 0..n_rows {
        let vm = v.row(m);
        decay.fill(1.0);
        k[[m, m]] = a[m];
        for n in (m + 1)..n_rows {
            decay *= &p.row(n - 1);
            let un = u.row(n);
            let value: f64 = (0..rank).map(|j| un[j] * vm[j] * decay[j]).sum();
            k[[n, m]] = value;
            k[[m, n]] = value;
        }
    }
    k
}
