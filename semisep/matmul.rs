use crate::blocks::{add_outer, scale_rows};
use ndarray::linalg::general_mat_vec_mul;
use ndarray::{Array2, ArrayView1, ArrayView2};

/// Computes `Y = K * Z` without forming `K`.
///
/// Two independent sweeps, each carrying a `J x Nrhs` accumulator:
/// the backward sweep collects the strictly upper triangle plus the diagonal,
/// the forward sweep adds the strictly lower triangle. O(N J Nrhs).
pub fn matmul(
    a: ArrayView1<'_, f64>,
    u: ArrayView2<'_, f64>,
    v: ArrayView2<'_, f64>,
    p: ArrayView2<'_, f64>,
    z: ArrayView2<'_, f64>,
) -> Array2<f64> {
    let (n_rows, rank) = u.dim();
    let nrhs = z.ncols();
    debug_assert_eq!(z.nrows(), n_rows);

    let mut y = Array2::zeros((n_rows, nrhs));
    if n_rows == 0 {
        return y;
    }
    let mut f = Array2::<f64>::zeros((rank, nrhs));

    let last = n_rows - 1;
    y.row_mut(last).scaled_add(a[last], &z.row(last));

    // Upper triangle: F = diag(P[n]) (F + U[n+1]^T Z[n+1]).
    for n in (0..last).rev() {
        add_outer(&mut f, 1.0, u.row(n + 1), z.row(n + 1));
        scale_rows(&mut f, p.row(n));
        let mut yn = y.row_mut(n);
        yn.scaled_add(a[n], &z.row(n));
        general_mat_vec_mul(1.0, &f.t(), &v.row(n), 1.0, &mut yn);
    }

    // Lower triangle: F = diag(P[n-1]) (F + V[n-1]^T Z[n-1]).
    f.fill(0.0);
    for n in 1..n_rows {
        add_outer(&mut f, 1.0, v.row(n - 1), z.row(n - 1));
        scale_rows(&mut f, p.row(n - 1));
        general_mat_vec_mul(1.0, &f.t(), &u.row(n), 1.0, &mut y.row_mut(n));
    }

    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::to_dense;
    use crate::test_fixtures::{random_representation, standard_normal_matrix};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_matches_dense_product() {
        for (seed, (n, rank, nrhs)) in [(5, 2, 3), (1, 1, 1), (12, 3, 2), (7, 4, 1)]
            .into_iter()
            .enumerate()
        {
            let (a, u, v, p) = random_representation(n, rank, seed as u64);
            let z = standard_normal_matrix(n, nrhs, 100 + seed as u64);

            let fast = matmul(a.view(), u.view(), v.view(), p.view(), z.view());
            let slow = to_dense(a.view(), u.view(), v.view(), p.view()).dot(&z);

            assert_eq!(fast.dim(), (n, nrhs));
            for (got, want) in fast.iter().zip(slow.iter()) {
                assert_abs_diff_eq!(*got, *want, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_identity_columns_recover_matrix() {
        let a = array![1.0, 1.0, 1.0];
        let u = array![[1.0], [1.0], [1.0]];
        let p = array![[0.5], [0.5]];
        let eye = Array2::<f64>::eye(3);
        let k = matmul(a.view(), u.view(), u.view(), p.view(), eye.view());
        let expected = array![[1.0, 0.5, 0.25], [0.5, 1.0, 0.5], [0.25, 0.5, 1.0]];
        for (got, want) in k.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-15);
        }
    }
}
