//! Numerical core: Krylov state, Ritz extraction, and the Arnoldi and
//! implicit-restart engines.
//!
//! The submodules hold the two halves of the algorithm: [`arnoldi`] builds
//! the orthonormal Krylov basis and upper-Hessenberg matrix by repeated
//! operator application, and [`restart`] compresses them with shifted-QR
//! steps. This module owns the state they share, [`KrylovState`], and the
//! spectral bookkeeping ([`SpectralDecomposition`], [`RitzPair`]) both need.
//!
//! Everything here is deterministic linear algebra; the only contact with
//! the stochastic world is through the
//! [`TransportOperator`](crate::operator::TransportOperator) passed into the
//! iteration functions.

pub mod arnoldi;
pub mod restart;

use faer::{Mat, MatRef, c64, prelude::*};

use crate::error::{ArnoldiError, ArnoldiErrorKind};

/// Default tolerance on the Hessenberg subdiagonal below which the Krylov
/// subspace is declared invariant. Not an error: an invariant subspace means
/// the eigenpairs are exact.
pub const DEFAULT_INVARIANCE_TOL: f64 = 1e-12;

/// Default tolerance on the Ritz residual estimate.
pub const DEFAULT_RESIDUAL_TOL: f64 = 1e-10;

/// The mutable state of one Arnoldi factorization `A Q_k = Q_{k+1} H_k`.
///
/// Owns the upper-Hessenberg matrix `H` (allocated `(m+1) x m` up front) and
/// the basis matrix `Q` (`len x (m+1)`), where `m` is the iteration capacity
/// of one expansion. The state is created fresh for each explicit restart;
/// an implicit restart compresses it in place, keeping the leading columns.
///
/// Invariants maintained by the expansion code: the first `k+1` basis
/// columns are orthonormal to working tolerance, and `H[i, j]` is non-zero
/// only for `i <= j + 1`.
#[derive(Debug, Clone)]
pub struct KrylovState {
    h: Mat<f64>,
    basis: Mat<f64>,
    k: usize,
    capacity: usize,
    residuals: Vec<f64>,
    estimates: Vec<c64>,
}

impl KrylovState {
    /// Starts a factorization from `q0`, which is normalized into the first
    /// basis column. Fails on a zero starting vector or zero capacity.
    pub fn new(q0: MatRef<'_, f64>, capacity: usize) -> Result<Self, ArnoldiError> {
        if capacity == 0 {
            return Err(ArnoldiErrorKind::InvalidInput(
                "iteration capacity must be greater than zero".into(),
            )
            .into());
        }
        if q0.ncols() != 1 {
            return Err(ArnoldiErrorKind::InvalidInput(
                "starting vector must be a single column".into(),
            )
            .into());
        }
        let norm = q0.norm_l2();
        if norm == 0.0 {
            return Err(ArnoldiErrorKind::InvalidInput(
                "starting vector must not be the zero vector".into(),
            )
            .into());
        }

        let mut basis = Mat::zeros(q0.nrows(), capacity + 1);
        for i in 0..q0.nrows() {
            basis[(i, 0)] = q0[(i, 0)] / norm;
        }

        Ok(Self {
            h: Mat::zeros(capacity + 1, capacity),
            basis,
            k: 0,
            capacity,
            residuals: Vec::new(),
            estimates: Vec::new(),
        })
    }

    /// Number of completed iterations.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Maximum number of iterations this state can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Dimension of the underlying vector space.
    pub fn len(&self) -> usize {
        self.basis.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The full `(m+1) x m` Hessenberg storage.
    pub fn h(&self) -> MatRef<'_, f64> {
        self.h.as_ref()
    }

    /// The leading `k x k` Hessenberg block whose eigenpairs approximate the
    /// operator's.
    pub fn h_square(&self) -> MatRef<'_, f64> {
        self.h.as_ref().get(0..self.k, 0..self.k)
    }

    /// The first `k` orthonormal basis vectors.
    pub fn basis(&self) -> MatRef<'_, f64> {
        self.basis.as_ref().get(.., 0..self.k)
    }

    /// The basis including the trailing residual direction, `k + 1` columns.
    pub fn basis_extended(&self) -> MatRef<'_, f64> {
        self.basis.as_ref().get(.., 0..self.k + 1)
    }

    /// The subdiagonal entry `H[k, k-1]` produced by the latest iteration;
    /// this is the residual norm of the factorization.
    pub fn subdiagonal(&self) -> f64 {
        debug_assert!(self.k > 0);
        self.h[(self.k, self.k - 1)]
    }

    /// Residual estimates, one per completed iteration. Append-only.
    pub fn residual_history(&self) -> &[f64] {
        &self.residuals
    }

    /// Dominant Ritz value after each completed iteration.
    pub fn estimate_history(&self) -> &[c64] {
        &self.estimates
    }
}

/// Eigenpairs of a Hessenberg block, sorted ascending by real part (ties by
/// imaginary part). The convention throughout the crate is that the *last*
/// pair is the dominant one.
#[derive(Debug, Clone)]
pub struct SpectralDecomposition {
    /// Eigenvalues in ascending order.
    pub values: Vec<c64>,
    /// Unit-norm eigenvectors of the Hessenberg block, one column per
    /// eigenvalue, in matching order.
    pub vectors: Mat<c64>,
}

impl SpectralDecomposition {
    /// Computes and sorts the eigenpairs of a square real matrix.
    pub fn of(m: MatRef<'_, f64>) -> Result<Self, ArnoldiError> {
        if m.nrows() == 0 {
            return Err(ArnoldiErrorKind::InvalidInput(
                "cannot decompose an empty matrix".into(),
            )
            .into());
        }
        let evd = m
            .eigen()
            .map_err(|e| ArnoldiError::from(ArnoldiErrorKind::EvdError(e)))?;
        let raw_values = evd.S();
        let raw_vectors = evd.U();

        let n = m.nrows();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            let (va, vb) = (raw_values[a], raw_values[b]);
            va.re
                .partial_cmp(&vb.re)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(va.im.partial_cmp(&vb.im).unwrap_or(std::cmp::Ordering::Equal))
        });

        let values: Vec<c64> = order.iter().map(|&i| raw_values[i]).collect();
        let vectors = Mat::from_fn(n, n, |i, j| raw_vectors[(i, order[j])]);

        Ok(Self { values, vectors })
    }

    /// The dominant (largest real part) eigenvalue.
    pub fn dominant_value(&self) -> c64 {
        // `of` rejects empty input, so the list is never empty.
        self.values[self.values.len() - 1]
    }

    /// The dominant eigenvector of the Hessenberg block, as an owned vector.
    pub fn dominant_vector(&self) -> Vec<c64> {
        let last = self.values.len() - 1;
        (0..self.vectors.nrows())
            .map(|i| self.vectors[(i, last)])
            .collect()
    }

    /// Ritz vectors of the full operator: linear combinations of the Krylov
    /// basis with the Hessenberg eigenvector components as coefficients.
    pub fn ritz_vectors(&self, basis: MatRef<'_, f64>) -> Mat<c64> {
        let n = self.values.len();
        let len = basis.nrows();
        // The basis is real, so the product splits into independent real and
        // imaginary parts.
        let re = Mat::from_fn(n, n, |i, j| self.vectors[(i, j)].re);
        let im = Mat::from_fn(n, n, |i, j| self.vectors[(i, j)].im);
        let basis_re = basis * re;
        let basis_im = basis * im;
        Mat::from_fn(len, n, |i, j| c64::new(basis_re[(i, j)], basis_im[(i, j)]))
    }
}

/// A single eigenvalue/eigenvector estimate of the transport operator.
#[derive(Debug, Clone)]
pub struct RitzPair {
    /// Eigenvalue estimate.
    pub value: c64,
    /// Ritz vector over the operator's space (complex in general; its real
    /// part is the physical density for the dominant mode).
    pub vector: Vec<c64>,
}
