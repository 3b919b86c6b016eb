#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

//! Linear-time kernels for symmetric semiseparable matrices.
//!
//! A semiseparable matrix of size N and rank J is stored as four arrays
//! `(a, U, V, P)`:
//!
//! ```text
//! K[n][n] = a[n]
//! K[n][m] = sum_j U[n][j] * V[m][j] * prod_{i=m}^{n-1} P[i][j]    for n > m
//! K[m][n] = K[n][m]
//! ```
//!
//! The modules below implement dense expansion, matrix products, the
//! `K = L D L^T` factorization, solves, Cholesky-style sampling and the
//! Gaussian-Process conditional mean, each in O(N) time, plus hand-derived
//! reverse-mode gradients for the factorization and the solve.
//!
//! Every kernel comes in two forms: an in-place function over ndarray views
//! (the `factor`, `solve`, ... free functions) and an owned convenience
//! method on [`SemiseparableMatrix`] or [`Factorization`].

pub mod batch;
pub mod blocks;
pub mod dense;
pub mod factor;
pub mod matmul;
pub mod matrix;
pub mod predict;
pub mod sample;
pub mod solve;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use batch::{BatchConfig, factor_all, solve_all};
pub use blocks::RowBlocks;
pub use dense::to_dense;
pub use factor::{
    FactorError, FactorGradient, FactorState, Factorization, factor, factor_grad,
    factor_with_state,
};
pub use matmul::matmul;
pub use matrix::{SemiseparableMatrix, SemiseparableParts, ShapeError};
pub use predict::conditional_mean;
pub use sample::dot_tril;
pub use solve::{SolveGradient, SolveState, solve, solve_grad, solve_with_state};
