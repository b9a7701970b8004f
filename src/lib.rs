//! Restarted Arnoldi eigensolvers driven by Monte Carlo particle transport.
//!
//! This crate estimates the dominant eigenvalues and eigenvectors of the
//! neutron transport fission operator without ever forming the operator as a
//! matrix. The operator's action on a fission source density is simulated by
//! tracking particle histories through a one-dimensional slab
//! ([`markov::TransportCycle`]), and the resulting noisy matrix-vector
//! products feed a restarted Arnoldi iteration that extracts the spectrum
//! from many fewer transport cycles than power iteration would need.
//!
//! Built on the [`faer`] linear algebra framework for the dense Hessenberg
//! work, the Arnoldi core accepts anything implementing
//! [`operator::TransportOperator`], so the same drivers run against exact
//! matrices (for validation), synthetically noisy matrices, and the full
//! Monte Carlo transport cycle.
//!
//! ## Solvers
//!
//! **Explicitly restarted** ([`eram`]): each cycle rebuilds the Krylov basis
//! from the previous dominant Ritz vector, and the per-cycle eigenvalue
//! estimates accumulate into a mean with a standard error. Robust when the
//! operator noise is large.
//!
//! **Implicitly restarted** ([`iram`]): the factorization is compressed in
//! place with shifted-QR steps between cycles, keeping the wanted Ritz
//! approximations without discarding the orthogonalization work.
//!
//! ## Example Usage
//!
//! The drivers are exercised most simply against an exact dense operator,
//! where the computed dominant eigenvalue can be checked directly:
//!
//! ```rust
//! use arnoldi_mc::operator::DenseOperator;
//! use arnoldi_mc::{SolverConfig, solve};
//! use faer::Mat;
//!
//! // diag(1, 2, 3, 4, 5): the dominant eigenvalue is 5.
//! let mut operator = DenseOperator::counting_diagonal(5);
//!
//! let config = SolverConfig {
//!     iterations: 5,
//!     restarts: 3,
//!     ..SolverConfig::default()
//! };
//! let start = Mat::from_fn(5, 1, |_, _| 1.0);
//!
//! let output = solve(&mut operator, start.as_ref(), &config).unwrap();
//! assert!(output.converged);
//! assert!((output.dominant().re - 5.0).abs() < 1e-8);
//! ```
//!
//! For the physical problem, wrap a configured transport cycle in
//! [`operator::MonteCarloOperator`] and hand it to the same entry points;
//! see the `slab` binary for a complete run.

// Declare the modules that form the crate's API structure.
pub mod algorithms;
pub mod error;
pub mod geometry;
pub mod markov;
pub mod operator;
pub mod particle;
pub mod solvers;
pub mod source;
pub mod utils;

// Re-export the main driver API for convenient access.
pub use solvers::{DriverPhase, SolverConfig, SolverOutput, eram, iram, solve};
