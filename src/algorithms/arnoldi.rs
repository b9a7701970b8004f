//! Arnoldi expansion of a Krylov factorization.
//!
//! ** NOTE: We recommend using the high-level drivers in [`crate::solvers`]
//! instead. This module is intended for use cases where fine-grained control
//! over the Arnoldi process is required.
//!
//! The main function [`expand`] grows a [`KrylovState`] one operator
//! application at a time until its capacity is reached or a termination
//! criterion fires. Each step orthogonalizes the new direction against the
//! existing basis with classical Gram-Schmidt followed by an unconditional
//! second pass, which is what keeps the basis orthonormal when the operator
//! is a noisy Monte Carlo estimate rather than an exact matrix product.
//!
//! Memory usage scales as O(nm) where n is the problem dimension and m is
//! the expansion capacity. The basis is pre-allocated by [`KrylovState`], so
//! the loop itself allocates only the per-step work vector.

use log::{debug, trace};

use super::{KrylovState, SpectralDecomposition};
use crate::error::{ArnoldiError, ArnoldiErrorKind};
use crate::operator::TransportOperator;

/// Why an expansion stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// All `m` iterations were performed.
    CapacityReached,
    /// The dominant Ritz residual estimate dropped below tolerance.
    ResidualConverged,
    /// The subdiagonal vanished: the Krylov subspace is invariant and the
    /// Ritz pairs are exact. A success, not a failure.
    InvariantSubspace,
}

/// Tolerances controlling early termination of [`expand`].
#[derive(Debug, Clone, Copy)]
pub struct ExpansionOptions {
    /// Subdiagonal threshold for declaring the subspace invariant.
    pub invariance_tol: f64,
    /// Threshold on the dominant Ritz residual estimate.
    pub residual_tol: f64,
}

impl Default for ExpansionOptions {
    fn default() -> Self {
        Self {
            invariance_tol: super::DEFAULT_INVARIANCE_TOL,
            residual_tol: super::DEFAULT_RESIDUAL_TOL,
        }
    }
}

/// The outcome of one expansion phase.
#[derive(Debug, Clone)]
pub struct ExpansionReport {
    /// Why the expansion stopped.
    pub termination: Termination,
    /// Sorted eigenpairs of the final Hessenberg block.
    pub spectral: SpectralDecomposition,
}

/// Performs a single Arnoldi step: applies the operator to the newest basis
/// vector, orthogonalizes the result against all previous vectors, and
/// appends the normalized remainder as the next basis column.
///
/// The projection coefficients land in column `k` of the Hessenberg matrix,
/// and the remainder's norm lands on the subdiagonal at `H[k+1, k]`. That
/// subdiagonal entry is also the return value; a (numerically) zero value
/// means the subspace is invariant and the caller must stop iterating.
///
/// A second Gram-Schmidt pass always runs. With an exact operator it is a
/// no-op to rounding; with a stochastic operator the first projection is
/// computed against a noisy vector and the correction is what preserves
/// orthogonality across many iterations.
pub fn arnoldi_iteration(
    operator: &mut dyn TransportOperator,
    state: &mut KrylovState,
) -> Result<f64, ArnoldiError> {
    let k = state.k;
    if k >= state.capacity {
        return Err(ArnoldiErrorKind::InvalidInput(format!(
            "factorization is full: capacity {} reached",
            state.capacity
        ))
        .into());
    }

    let mut w = {
        let q = state.basis.as_ref().get(.., k..k + 1);
        operator.apply(q)?
    };
    if w.nrows() != state.len() || w.ncols() != 1 {
        return Err(ArnoldiErrorKind::DimensionMismatch {
            operator_len: state.len(),
            vector_rows: w.nrows(),
        }
        .into());
    }

    // Classical Gram-Schmidt: project onto the active basis in one matrix
    // product, then subtract.
    let active = state.basis.as_ref().get(.., 0..k + 1);
    let proj = active.transpose() * w.as_ref();
    w = w - active * proj.as_ref();

    // Re-orthogonalization pass. The correction folds into the same
    // Hessenberg column.
    let correction = active.transpose() * w.as_ref();
    w = w - active * correction.as_ref();

    for j in 0..=k {
        state.h[(j, k)] = proj[(j, 0)] + correction[(j, 0)];
    }

    let norm = w.norm_l2();
    state.h[(k + 1, k)] = norm;
    if norm > 0.0 {
        for i in 0..state.len() {
            state.basis[(i, k + 1)] = w[(i, 0)] / norm;
        }
    }
    state.k = k + 1;
    trace!("arnoldi step {}: subdiagonal {:.3e}", state.k, norm);

    Ok(norm)
}

/// Expands the factorization until capacity, convergence, or invariance.
///
/// After every step the eigenpairs of the current Hessenberg block are
/// computed and the dominant Ritz residual estimate
/// `|u_k[k-1]| * H[k, k-1]` is recorded into the state's history, so the
/// caller can inspect the per-iteration trajectory afterward.
pub fn expand(
    operator: &mut dyn TransportOperator,
    state: &mut KrylovState,
    options: &ExpansionOptions,
) -> Result<ExpansionReport, ArnoldiError> {
    loop {
        let subdiag = arnoldi_iteration(operator, state)?;
        let spectral = SpectralDecomposition::of(state.h_square())?;

        let k = state.k;
        // Last component of the dominant Hessenberg eigenvector scales the
        // factorization residual into a Ritz residual estimate.
        let tail = spectral.vectors[(k - 1, k - 1)].norm();
        let residual = tail * subdiag;
        let dominant = spectral.dominant_value();
        state.residuals.push(residual);
        state.estimates.push(dominant);
        debug!(
            "iteration {k}: dominant estimate {:.6}{:+.2e}i, residual {residual:.3e}",
            dominant.re, dominant.im
        );

        let termination = if subdiag < options.invariance_tol {
            debug!("subdiagonal {subdiag:.3e} below invariance tolerance, stopping");
            Some(Termination::InvariantSubspace)
        } else if residual < options.residual_tol {
            debug!("residual {residual:.3e} below tolerance, stopping");
            Some(Termination::ResidualConverged)
        } else if k == state.capacity {
            Some(Termination::CapacityReached)
        } else {
            None
        };

        if let Some(termination) = termination {
            return Ok(ExpansionReport {
                termination,
                spectral,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::DenseOperator;
    use faer::Mat;

    fn uniform_start(n: usize) -> Mat<f64> {
        Mat::from_fn(n, 1, |_, _| 1.0)
    }

    #[test]
    fn basis_stays_orthonormal() {
        let mut op = DenseOperator::counting_diagonal(8);
        let q0 = uniform_start(8);
        let mut state = KrylovState::new(q0.as_ref(), 5).unwrap();
        for _ in 0..5 {
            arnoldi_iteration(&mut op, &mut state).unwrap();
        }

        let q = state.basis_extended();
        let gram = q.transpose() * q;
        for i in 0..gram.nrows() {
            for j in 0..gram.ncols() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (gram[(i, j)] - expected).abs() < 1e-12,
                    "gram[({i},{j})] = {}",
                    gram[(i, j)]
                );
            }
        }
    }

    #[test]
    fn factorization_identity_holds() {
        // A Q_k = Q_{k+1} H for the exact operator.
        let mut op = DenseOperator::counting_diagonal(6);
        let q0 = uniform_start(6);
        let mut state = KrylovState::new(q0.as_ref(), 4).unwrap();
        for _ in 0..4 {
            arnoldi_iteration(&mut op, &mut state).unwrap();
        }

        let lhs = op.matrix() * state.basis();
        let rhs = state.basis_extended() * state.h().get(0..5, 0..4);
        for i in 0..6 {
            for j in 0..4 {
                assert!((lhs[(i, j)] - rhs[(i, j)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn eigenvector_start_terminates_as_invariant() {
        // Starting from an exact eigenvector the remainder vanishes at once.
        let mut op = DenseOperator::counting_diagonal(5);
        let q0 = Mat::from_fn(5, 1, |i, _| if i == 2 { 1.0 } else { 0.0 });
        let mut state = KrylovState::new(q0.as_ref(), 4).unwrap();
        let report = expand(&mut op, &mut state, &ExpansionOptions::default()).unwrap();
        assert_eq!(report.termination, Termination::InvariantSubspace);
        assert_eq!(state.k(), 1);
        assert!((report.spectral.dominant_value().re - 3.0).abs() < 1e-10);
    }

    #[test]
    fn expansion_converges_on_diagonal_operator() {
        let mut op = DenseOperator::counting_diagonal(5);
        let q0 = uniform_start(5);
        let mut state = KrylovState::new(q0.as_ref(), 5).unwrap();
        let report = expand(&mut op, &mut state, &ExpansionOptions::default()).unwrap();
        // A 5-step expansion of a 5-dimensional space is exact.
        assert!((report.spectral.dominant_value().re - 5.0).abs() < 1e-8);
        assert_eq!(report.spectral.values.len(), state.k());
        assert_eq!(state.residual_history().len(), state.k());
    }

    #[test]
    fn full_state_rejects_further_iterations() {
        let mut op = DenseOperator::counting_diagonal(4);
        let q0 = uniform_start(4);
        let mut state = KrylovState::new(q0.as_ref(), 2).unwrap();
        arnoldi_iteration(&mut op, &mut state).unwrap();
        arnoldi_iteration(&mut op, &mut state).unwrap();
        assert!(arnoldi_iteration(&mut op, &mut state).is_err());
    }
}
