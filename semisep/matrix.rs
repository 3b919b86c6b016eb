use crate::dense;
use crate::factor::{self, FactorError, FactorState, Factorization};
use crate::matmul;
use crate::predict;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for building a [`SemiseparableMatrix`] from raw arrays.
///
/// Raised by [`SemiseparableMatrix::new`] and by deserialization, which goes
/// through `new`. The in-place kernels trust their callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Left and right factors must have the same shape. U is {left:?}, V is {right:?}.")]
    FactorShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    #[error("Diagonal has {found} entries, but the factors have {expected} rows.")]
    DiagonalLength { expected: usize, found: usize },
    #[error(
        "Propagator must have shape {expected:?} (one row per step between consecutive rows), got {found:?}."
    )]
    PropagatorShape {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// A symmetric `N x N` semiseparable matrix of rank `J`, stored implicitly.
///
/// For `n > m`,
/// `K[n][m] = sum_j U[n][j] * V[m][j] * prod_{i=m}^{n-1} P[i][j]`,
/// the upper triangle mirrors the lower one and `K[n][n] = a[n]`.
///
/// The representation only carries shapes. Positive-definiteness and the
/// usual `0 < P <= 1` range are left to whoever builds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SemiseparableParts")]
pub struct SemiseparableMatrix {
    a: Array1<f64>,
    u: Array2<f64>,
    v: Array2<f64>,
    p: Array2<f64>,
}

/// Unchecked `(a, U, V, P)` as they appear on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct SemiseparableParts {
    pub a: Array1<f64>,
    pub u: Array2<f64>,
    pub v: Array2<f64>,
    pub p: Array2<f64>,
}

impl TryFrom<SemiseparableParts> for SemiseparableMatrix {
    type Error = ShapeError;

    fn try_from(parts: SemiseparableParts) -> Result<Self, ShapeError> {
        Self::new(parts.a, parts.u, parts.v, parts.p)
    }
}

impl SemiseparableMatrix {
    /// Checks that `a` is `(N)`, `u` and `v` are `(N, J)` and `p` is `(N-1, J)`.
    pub fn new(
        a: Array1<f64>,
        u: Array2<f64>,
        v: Array2<f64>,
        p: Array2<f64>,
    ) -> Result<Self, ShapeError> {
        if u.dim() != v.dim() {
            return Err(ShapeError::FactorShapeMismatch {
                left: u.dim(),
                right: v.dim(),
            });
        }
        let (n, rank) = u.dim();
        if a.len() != n {
            return Err(ShapeError::DiagonalLength {
                expected: n,
                found: a.len(),
            });
        }
        let expected = (n.saturating_sub(1), rank);
        if p.dim() != expected {
            return Err(ShapeError::PropagatorShape {
                expected,
                found: p.dim(),
            });
        }
        Ok(Self { a, u, v, p })
    }

    /// Matrix size `N`.
    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// Number of latent components `J`.
    pub fn rank(&self) -> usize {
        self.u.ncols()
    }

    pub fn diag(&self) -> ArrayView1<'_, f64> {
        self.a.view()
    }

    pub fn left(&self) -> ArrayView2<'_, f64> {
        self.u.view()
    }

    pub fn right(&self) -> ArrayView2<'_, f64> {
        self.v.view()
    }

    pub fn propagator(&self) -> ArrayView2<'_, f64> {
        self.p.view()
    }

    /// Explicit `N x N` matrix. O(N^2 J); meant for checks on small inputs.
    pub fn to_dense(&self) -> Array2<f64> {
        dense::to_dense(self.a.view(), self.u.view(), self.v.view(), self.p.view())
    }

    /// `K * z` for an `(N, Nrhs)` block of vectors.
    pub fn matmul(&self, z: ArrayView2<'_, f64>) -> Array2<f64> {
        matmul::matmul(
            self.a.view(),
            self.u.view(),
            self.v.view(),
            self.p.view(),
            z,
        )
    }

    /// Factorizes `K = L D L^T` without keeping the gradient state.
    pub fn factor(&self) -> Result<Factorization<'_>, FactorError> {
        let mut d = self.a.clone();
        let mut w = self.v.clone();
        factor::factor(self.u.view(), self.p.view(), d.view_mut(), w.view_mut())
            .inspect_err(|err| log::debug!("Semiseparable factorization failed: {err}"))?;
        Ok(Factorization::from_parts(self, d, w))
    }

    /// Factorizes and keeps the per-row snapshots needed by
    /// [`Factorization::factor_grad`].
    pub fn factor_with_state(&self) -> Result<(Factorization<'_>, FactorState), FactorError> {
        let mut d = self.a.clone();
        let mut w = self.v.clone();
        let state = factor::factor_with_state(
            self.u.view(),
            self.p.view(),
            d.view_mut(),
            w.view_mut(),
        )
        .inspect_err(|err| log::debug!("Semiseparable factorization failed: {err}"))?;
        Ok((Factorization::from_parts(self, d, w), state))
    }

    /// Posterior mean at `M` query points given the solve residual `z`.
    ///
    /// See [`predict::conditional_mean`] for the meaning of `u_star`, `v_star`
    /// and `inds`.
    pub fn conditional_mean(
        &self,
        z: ArrayView1<'_, f64>,
        u_star: ArrayView2<'_, f64>,
        v_star: ArrayView2<'_, f64>,
        inds: ArrayView1<'_, usize>,
    ) -> Array1<f64> {
        predict::conditional_mean(
            self.u.view(),
            self.v.view(),
            self.p.view(),
            z,
            u_star,
            v_star,
            inds,
        )
    }
}
