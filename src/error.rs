//! This module defines the custom error types for the library.
//!
//! All failure conditions of the eigensolver are centralized in a single
//! enum: [`ArnoldiErrorKind`], wrapped by the public [`ArnoldiError`] type.
//!
//! The taxonomy is deliberately small. Numerical conditions that terminate an
//! Arnoldi expansion early (an invariant subspace, a converged residual) are
//! *not* errors; they are reported through the solver diagnostics. Likewise,
//! exhausting the restart budget produces a non-converged result, not an
//! error. What remains here are configuration mistakes that are rejected
//! before any stochastic work begins, and failures bubbling up from the
//! eigendecomposition of the Hessenberg matrix.
//!
//! Using the [`thiserror`] crate allows us to create idiomatic error types
//! with minimal boilerplate. Note that [`faer::linalg::evd::EvdError`] does
//! not implement the standard [`std::error::Error`] trait, so we wrap it
//! manually to provide a compatible error type.
use thiserror::Error;

/// Represents all possible errors that can occur while building or running
/// the eigensolver.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct ArnoldiError(#[from] ArnoldiErrorKind);

/// Private enum containing the distinct kinds of errors.
/// This separation allows for a clean `Display` implementation via
/// [`thiserror`] while handling non-standard error types manually.
#[derive(Error, Debug, PartialEq)]
pub(crate) enum ArnoldiErrorKind {
    /// An invalid parameter was supplied to a constructor. Raised before any
    /// particle history is simulated.
    #[error("Invalid input parameter: {0}")]
    InvalidInput(String),

    /// The dimensions of the operator and a vector are incompatible.
    #[error(
        "Dimension mismatch: operator has length {operator_len} but vector has {vector_rows} rows."
    )]
    DimensionMismatch {
        operator_len: usize,
        vector_rows: usize,
    },

    /// Wraps an error originating from [`faer`]'s eigendecomposition module.
    #[error("A numerical error occurred during the eigendecomposition of H: {0:?}")]
    EvdError(faer::linalg::evd::EvdError),
}

// Manually implement PartialEq for the public error type.
// We compare the inner `ArnoldiErrorKind`.
impl PartialEq for ArnoldiError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
