//! Gaussian-Process conditional mean at new inputs.
//!
//! Given the solve residual `z = K^{-1} y` for the training rows, the mean at a
//! query is `sum_n k(query, n) z[n]`. With semiseparable kernels the
//! contribution of every training row before the query is carried in a single
//! length-`J` state, and likewise for every row after it, so all `M` queries
//! are served by one forward and one backward merge-walk over the training
//! rows: O(N + M) rather than O(N M).
//!
//! Each query `m` supplies its own factors `u_star[m]`, `v_star[m]` and an
//! insertion index `inds[m]`: the number of training rows at or before the
//! query. `u_star[m]` multiplies the causal state propagated to training row
//! `inds[m]` (or left at the last row when `inds[m] == N`), `v_star[m]`
//! multiplies the anti-causal state propagated to row `inds[m] - 1` (or left
//! at row 0 when `inds[m] == 0`). Building those factors from kernel
//! parameters and query locations is up to the caller.

use ndarray::{Array1, ArrayView1, ArrayView2};

/// Conditional mean at `M` queries. `inds` must be non-decreasing; this is
/// not checked.
pub fn conditional_mean(
    u: ArrayView2<'_, f64>,
    v: ArrayView2<'_, f64>,
    p: ArrayView2<'_, f64>,
    z: ArrayView1<'_, f64>,
    u_star: ArrayView2<'_, f64>,
    v_star: ArrayView2<'_, f64>,
    inds: ArrayView1<'_, usize>,
) -> Array1<f64> {
    let (n_rows, rank) = u.dim();
    let n_queries = u_star.nrows();
    debug_assert_eq!(inds.len(), n_queries);
    debug_assert!(inds.iter().zip(inds.iter().skip(1)).all(|(a, b)| a <= b));

    let mut mu = Array1::<f64>::zeros(n_queries);
    if n_rows == 0 {
        return mu;
    }
    let mut q = Array1::<f64>::zeros(rank);

    // Causal pass. Queries before the first training row get nothing here.
    let mut m = 0;
    while m < n_queries && inds[m] == 0 {
        mu[m] = 0.0;
        m += 1;
    }
    for n in 0..n_rows - 1 {
        q.scaled_add(z[n], &v.row(n));
        q *= &p.row(n);
        while m < n_queries && inds[m] <= n + 1 {
            mu[m] = u_star.row(m).dot(&q);
            m += 1;
        }
    }
    q.scaled_add(z[n_rows - 1], &v.row(n_rows - 1));
    while m < n_queries {
        mu[m] = u_star.row(m).dot(&q);
        m += 1;
    }

    // Anti-causal pass, walking queries from the end. `pending` counts the
    // queries not yet visited, so the next one is `pending - 1`.
    let mut pending = n_queries;
    q.fill(0.0);
    while pending > 0 && inds[pending - 1] > n_rows - 1 {
        pending -= 1;
    }
    for n in (1..n_rows).rev() {
        q.scaled_add(z[n], &u.row(n));
        q *= &p.row(n - 1);
        while pending > 0 && inds[pending - 1] > n - 1 {
            pending -= 1;
            mu[pending] += v_star.row(pending).dot(&q);
        }
    }
    q.scaled_add(z[0], &u.row(0));
    while pending > 0 {
        pending -= 1;
        mu[pending] = v_star.row(pending).dot(&q);
    }

    mu
}
