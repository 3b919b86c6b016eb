//! Many independent systems at once.
//!
//! Each recurrence is strictly sequential in its rows, but separate systems
//! (one per light curve, say) share nothing, so a batch is split across
//! rayon workers one system per task.

use crate::factor::{FactorError, Factorization};
use crate::matrix::SemiseparableMatrix;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Execution settings for the batch entry points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Size of a dedicated worker pool. `None` runs on rayon's global pool.
    pub num_threads: Option<usize>,
    /// Batches shorter than this run sequentially on the calling thread.
    pub min_parallel_len: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            min_parallel_len: 4,
        }
    }
}

/// Factorizes every system. Failures are reported per system and do not
/// stop the rest of the batch.
pub fn factor_all<'a>(
    systems: &'a [SemiseparableMatrix],
    config: &BatchConfig,
) -> Vec<Result<Factorization<'a>, FactorError>> {
    let results = dispatch(config, systems.len(), |i| systems[i].factor());
    let failed = results.iter().filter(|r| r.is_err()).count();
    log::debug!(
        "Factorized {} semiseparable systems, {} not positive definite.",
        results.len(),
        failed
    );
    results
}

/// Solves `factorizations[i] x = rhs[i]` for every `i`.
pub fn solve_all(
    factorizations: &[Factorization<'_>],
    rhs: &[Array2<f64>],
    config: &BatchConfig,
) -> Vec<Array2<f64>> {
    debug_assert_eq!(factorizations.len(), rhs.len());
    let len = factorizations.len().min(rhs.len());
    dispatch(config, len, |i| factorizations[i].solve(rhs[i].view()))
}

fn dispatch<T, F>(config: &BatchConfig, len: usize, job: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if len < config.min_parallel_len {
        return (0..len).map(&job).collect();
    }
    let run = || (0..len).into_par_iter().map(&job).collect::<Vec<T>>();
    match config.num_threads {
        None => run(),
        Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(run),
            Err(err) => {
                log::warn!(
                    "Could not build a {threads}-thread pool ({err}); falling back to the global pool."
                );
                run()
            }
        },
    }
}
