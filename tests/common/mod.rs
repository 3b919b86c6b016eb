use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use semisep::SemiseparableMatrix;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn standard_normal_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| rng.sample(StandardNormal))
}

/// Positive-definite rank-`2 * terms` system: a sum of damped oscillations
/// `amp * exp(-rate |tau|) * cos(freq * tau)` on random increasing inputs,
/// plus white noise on the diagonal.
pub fn random_kernel_system(n: usize, terms: usize, seed: u64) -> SemiseparableMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut t = 0.0;
    let times: Vec<f64> = (0..n)
        .map(|_| {
            t += rng.gen_range(0.1..0.8);
            t
        })
        .collect();

    let rank = 2 * terms;
    let mut a = Array1::from_elem(n, rng.gen_range(0.1..0.3));
    let mut u = Array2::zeros((n, rank));
    let mut v = Array2::zeros((n, rank));
    let mut p = Array2::zeros((n.saturating_sub(1), rank));
    for term in 0..terms {
        let amp: f64 = rng.gen_range(0.5..1.5);
        let rate: f64 = rng.gen_range(0.2..1.2);
        let freq: f64 = rng.gen_range(0.0..2.0);
        a += amp;
        for (i, &ti) in times.iter().enumerate() {
            let (sin, cos) = (freq * ti).sin_cos();
            u[[i, 2 * term]] = amp * cos;
            u[[i, 2 * term + 1]] = amp * sin;
            v[[i, 2 * term]] = cos;
            v[[i, 2 * term + 1]] = sin;
            if i + 1 < n {
                let decay = (-rate * (times[i + 1] - times[i])).exp();
                p[[i, 2 * term]] = decay;
                p[[i, 2 * term + 1]] = decay;
            }
        }
    }
    SemiseparableMatrix::new(a, u, v, p).expect("consistent shapes")
}
