//! Random inputs shared by the unit tests.
//!
//! `kernel_matrix` builds positive-definite systems from a sum of an
//! exponential term and a damped cosine term on random ordered inputs, the
//! typical shape of a Gaussian-Process covariance on a time series.
//! `random_representation` draws unconstrained `(a, U, V, P)` for kernels
//! that do not need positive-definiteness.

use crate::matrix::SemiseparableMatrix;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

pub fn standard_normal_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| rng.sample(StandardNormal))
}

pub fn random_representation(
    n: usize,
    rank: usize,
    seed: u64,
) -> (Array1<f64>, Array2<f64>, Array2<f64>, Array2<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let a = Array1::from_shape_fn(n, |_| rng.gen_range(1.0..2.0));
    let u = Array2::from_shape_fn((n, rank), |_| rng.sample(StandardNormal));
    let v = Array2::from_shape_fn((n, rank), |_| rng.sample(StandardNormal));
    let p = Array2::from_shape_fn((n.saturating_sub(1), rank), |_| rng.gen_range(0.3..1.0));
    (a, u, v, p)
}

/// Rank-3 positive-definite system on `n` random increasing inputs.
pub fn kernel_matrix(n: usize, seed: u64) -> SemiseparableMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut t = 0.0;
    let times: Vec<f64> = (0..n)
        .map(|_| {
            t += rng.gen_range(0.2..1.0);
            t
        })
        .collect();

    let real_amp: f64 = rng.gen_range(0.5..1.5);
    let real_rate: f64 = rng.gen_range(0.2..1.0);
    let cos_amp: f64 = rng.gen_range(0.5..1.5);
    let cos_rate: f64 = rng.gen_range(0.2..1.0);
    let freq: f64 = rng.gen_range(0.5..2.0);
    let noise: f64 = rng.gen_range(0.1..0.3);

    let a = Array1::from_elem(n, real_amp + cos_amp + noise);
    let mut u = Array2::zeros((n, 3));
    let mut v = Array2::zeros((n, 3));
    for (i, &ti) in times.iter().enumerate() {
        let (sin, cos) = (freq * ti).sin_cos();
        u[[i, 0]] = real_amp;
        u[[i, 1]] = cos_amp * cos;
        u[[i, 2]] = cos_amp * sin;
        v[[i, 0]] = 1.0;
        v[[i, 1]] = cos;
        v[[i, 2]] = sin;
    }
    let mut p = Array2::zeros((n.saturating_sub(1), 3));
    for i in 0..n.saturating_sub(1) {
        let dt = times[i + 1] - times[i];
        p[[i, 0]] = (-real_rate * dt).exp();
        p[[i, 1]] = (-cos_rate * dt).exp();
        p[[i, 2]] = (-cos_rate * dt).exp();
    }
    SemiseparableMatrix::new(a, u, v, p).expect("fixture shapes are consistent")
}
