//! High-level drivers that run restarted Arnoldi iterations against a
//! transport operator and extract dominant eigenpairs.
//!
//! Two restart strategies are provided behind one entry point, [`solve`]:
//!
//! - **Explicit** ([`eram`]): each cycle starts a fresh factorization from
//!   the modulus of the previous cycle's dominant Ritz vector. Simple and
//!   robust against operator noise; the per-cycle dominant estimates are
//!   averaged into a mean with a standard error, and the driver stops once
//!   that standard error drops below [`SolverConfig::mean_error_tol`]. With
//!   a noisy operator this is the criterion that actually fires, since the
//!   Ritz residual bottoms out at the noise floor.
//! - **Implicit** ([`iram`]): the factorization is compressed in place with
//!   shifted-QR steps, retaining the wanted Ritz approximations and the
//!   orthogonality work already paid for.
//!
//! Failing to converge within the restart budget is an expected outcome for
//! a stochastic operator, so it is reported through
//! [`SolverOutput::converged`] and the diagnostics rather than as an error.

use faer::{Mat, MatRef, c64};
use log::{debug, info};

use crate::algorithms::arnoldi::{ExpansionOptions, Termination, expand};
use crate::algorithms::restart::implicit_restart;
use crate::algorithms::{
    DEFAULT_INVARIANCE_TOL, DEFAULT_RESIDUAL_TOL, KrylovState, SpectralDecomposition,
};

use crate::error::{ArnoldiError, ArnoldiErrorKind};
use crate::operator::TransportOperator;
use crate::utils::stats::RunningStats;

/// Default threshold on the standard error of the mean dominant estimate
/// for the explicit driver. Tight enough that exact operators converge on
/// the residual criterion first.
pub const DEFAULT_MEAN_ERROR_TOL: f64 = 1e-6;

/// How a driver recovers when an expansion hits capacity unconverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartStrategy {
    /// Start a fresh factorization from the dominant Ritz vector.
    Explicit,
    /// Compress the factorization in place with shifted-QR steps.
    #[default]
    Implicit,
}

/// Configuration for the restarted drivers.
#[derive(Debug, Clone, Copy)]
pub struct SolverConfig {
    /// Expansion capacity `m` of each cycle.
    pub iterations: usize,
    /// Maximum number of expansion cycles.
    pub restarts: usize,
    /// Number of eigenpairs to return; also the number of Ritz vectors an
    /// implicit restart retains.
    pub wanted: usize,
    /// Restart strategy.
    pub strategy: RestartStrategy,
    /// Subdiagonal threshold for declaring the subspace invariant.
    pub invariance_tol: f64,
    /// Convergence threshold on the dominant Ritz residual estimate.
    pub residual_tol: f64,
    /// Convergence threshold on the standard error of the mean dominant
    /// estimate, `std / sqrt(cycles)`. Checked by the explicit driver once
    /// at least two cycles have completed.
    pub mean_error_tol: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            restarts: 20,
            wanted: 1,
            strategy: RestartStrategy::default(),
            invariance_tol: DEFAULT_INVARIANCE_TOL,
            residual_tol: DEFAULT_RESIDUAL_TOL,
            mean_error_tol: DEFAULT_MEAN_ERROR_TOL,
        }
    }
}

impl SolverConfig {
    /// Checks the configuration against an operator before any work is
    /// done. Misconfiguration is a caller error and fails fast.
    pub fn validate(&self, operator_len: usize) -> Result<(), ArnoldiError> {
        if self.iterations < 2 {
            return Err(ArnoldiErrorKind::InvalidInput(format!(
                "at least 2 iterations per cycle are required, got {}",
                self.iterations
            ))
            .into());
        }
        if self.iterations > operator_len {
            return Err(ArnoldiErrorKind::InvalidInput(format!(
                "iterations per cycle ({}) cannot exceed the operator dimension ({operator_len})",
                self.iterations
            ))
            .into());
        }
        if self.restarts == 0 {
            return Err(
                ArnoldiErrorKind::InvalidInput("at least one cycle is required".into()).into(),
            );
        }
        if self.wanted == 0 || self.wanted >= self.iterations {
            return Err(ArnoldiErrorKind::InvalidInput(format!(
                "wanted eigenpairs must be between 1 and {}, got {}",
                self.iterations - 1,
                self.wanted
            ))
            .into());
        }
        if !(self.invariance_tol > 0.0 && self.invariance_tol.is_finite()) {
            return Err(ArnoldiErrorKind::InvalidInput(
                "invariance tolerance must be positive and finite".into(),
            )
            .into());
        }
        if !(self.residual_tol > 0.0 && self.residual_tol.is_finite()) {
            return Err(ArnoldiErrorKind::InvalidInput(
                "residual tolerance must be positive and finite".into(),
            )
            .into());
        }
        if !(self.mean_error_tol > 0.0 && self.mean_error_tol.is_finite()) {
            return Err(ArnoldiErrorKind::InvalidInput(
                "mean error tolerance must be positive and finite".into(),
            )
            .into());
        }
        Ok(())
    }

    fn expansion_options(&self) -> ExpansionOptions {
        ExpansionOptions {
            invariance_tol: self.invariance_tol,
            residual_tol: self.residual_tol,
        }
    }
}

/// Where the driver's state machine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    /// Growing the factorization by operator applications.
    Expanding,
    /// Compressing or reseeding after an unconverged cycle.
    Restarting,
    /// A convergence criterion was met.
    Converged,
    /// The restart budget ran out before convergence.
    Exhausted,
}

/// Per-run bookkeeping returned alongside the eigenpairs.
#[derive(Debug, Clone)]
pub struct SolverDiagnostics {
    /// Restart cycles completed (expansions that hit capacity).
    pub restarts_performed: usize,
    /// Total operator applications across all cycles.
    pub operator_applications: usize,
    /// Dominant Ritz residual estimate after every iteration.
    pub residual_history: Vec<f64>,
    /// Dominant Ritz value after every iteration.
    pub estimate_history: Vec<c64>,
    /// Running mean and spread of the per-cycle dominant estimates. With a
    /// stochastic operator the mean is a better eigenvalue estimate than
    /// any single cycle's value, and the standard error quantifies it.
    pub eigenvalue_stats: RunningStats,
    /// Terminal phase: [`DriverPhase::Converged`] or
    /// [`DriverPhase::Exhausted`].
    pub final_phase: DriverPhase,
}

/// The result of a restarted Arnoldi run.
#[derive(Debug, Clone)]
pub struct SolverOutput {
    /// The `wanted` largest eigenvalue estimates, ascending; the dominant
    /// one is last.
    pub eigenvalues: Vec<c64>,
    /// Matching unit-norm Ritz vectors, one column per eigenvalue.
    pub eigenvectors: Mat<c64>,
    /// Whether a convergence criterion was met. `false` is a legitimate
    /// outcome, not an error: the estimates and diagnostics are still
    /// meaningful.
    pub converged: bool,
    pub diagnostics: SolverDiagnostics,
}

impl SolverOutput {
    /// The dominant eigenvalue estimate.
    pub fn dominant(&self) -> c64 {
        // `solve` never returns an empty set.
        self.eigenvalues[self.eigenvalues.len() - 1]
    }
}

/// Runs the restarted Arnoldi driver selected by `config.strategy`.
///
/// `initial` seeds the first Krylov vector; it is normalized internally and
/// must be a non-zero column of the operator's dimension. Configuration
/// problems and operator failures surface as errors; running out of restart
/// cycles does not.
pub fn solve(
    operator: &mut dyn TransportOperator,
    initial: MatRef<'_, f64>,
    config: &SolverConfig,
) -> Result<SolverOutput, ArnoldiError> {
    config.validate(operator.len())?;
    if initial.nrows() != operator.len() || initial.ncols() != 1 {
        return Err(ArnoldiErrorKind::DimensionMismatch {
            operator_len: operator.len(),
            vector_rows: initial.nrows(),
        }
        .into());
    }

    let options = config.expansion_options();
    let mut state = KrylovState::new(initial, config.iterations)?;
    let mut stats = RunningStats::new();
    let mut residual_log = Vec::new();
    let mut estimate_log = Vec::new();
    let mut restarts_performed = 0usize;
    let mut applications = 0usize;

    enum DriverStep {
        Expand,
        Restart(SpectralDecomposition),
    }
    let mut step = DriverStep::Expand;

    let (spectral, final_phase) = loop {
        step = match step {
            DriverStep::Expand => {
                debug!(
                    "phase {:?}: cycle {restarts_performed}",
                    DriverPhase::Expanding
                );
                let k_before = state.k();
                let report = expand(operator, &mut state, &options)?;
                applications += state.k() - k_before;
                stats.push(report.spectral.dominant_value().re);

                match report.termination {
                    Termination::ResidualConverged | Termination::InvariantSubspace => {
                        break (report.spectral, DriverPhase::Converged);
                    }
                    Termination::CapacityReached => {
                        // For the explicit driver a settled cycle mean is a
                        // convergence criterion in its own right; a noisy
                        // operator keeps the residual pinned at the noise
                        // floor no matter how many cycles run.
                        if config.strategy == RestartStrategy::Explicit
                            && stats.count() >= 2
                            && stats.std_of_mean() < config.mean_error_tol
                        {
                            debug!(
                                "cycle mean {:.6} settled, standard error {:.3e}",
                                stats.mean(),
                                stats.std_of_mean()
                            );
                            break (report.spectral, DriverPhase::Converged);
                        }
                        restarts_performed += 1;
                        if restarts_performed >= config.restarts {
                            break (report.spectral, DriverPhase::Exhausted);
                        }
                        DriverStep::Restart(report.spectral)
                    }
                }
            }
            DriverStep::Restart(spectral) => {
                debug!("phase {:?}", DriverPhase::Restarting);
                match config.strategy {
                    RestartStrategy::Implicit => {
                        let outcome = implicit_restart(&mut state, &spectral, config.wanted)?;
                        if outcome.residual_norm < config.invariance_tol {
                            // The retained subspace is exactly invariant;
                            // its Ritz pairs are the answer.
                            let compressed = SpectralDecomposition::of(state.h_square())?;
                            break (compressed, DriverPhase::Converged);
                        }
                        DriverStep::Expand
                    }
                    RestartStrategy::Explicit => {
                        let ritz = spectral.ritz_vectors(state.basis());
                        let last = state.k() - 1;
                        let reseed = Mat::from_fn(state.len(), 1, |i, _| ritz[(i, last)].norm());
                        residual_log.extend_from_slice(state.residual_history());
                        estimate_log.extend_from_slice(state.estimate_history());
                        state = KrylovState::new(reseed.as_ref(), config.iterations)?;
                        DriverStep::Expand
                    }
                }
            }
        };
    };

    residual_log.extend_from_slice(state.residual_history());
    estimate_log.extend_from_slice(state.estimate_history());

    let converged = final_phase == DriverPhase::Converged;
    let available = spectral.values.len();
    let returned = config.wanted.min(available);
    let eigenvalues = spectral.values[available - returned..].to_vec();
    let ritz = spectral.ritz_vectors(state.basis());
    let eigenvectors = Mat::from_fn(state.len(), returned, |i, j| {
        ritz[(i, available - returned + j)]
    });

    info!(
        "driver finished in phase {final_phase:?}: dominant {:.6}{:+.2e}i after {} applications",
        eigenvalues[returned - 1].re,
        eigenvalues[returned - 1].im,
        applications
    );

    Ok(SolverOutput {
        eigenvalues,
        eigenvectors,
        converged,
        diagnostics: SolverDiagnostics {
            restarts_performed,
            operator_applications: applications,
            residual_history: residual_log,
            estimate_history: estimate_log,
            eigenvalue_stats: stats,
            final_phase,
        },
    })
}

/// Runs the explicitly restarted driver, reseeding each cycle from the
/// dominant Ritz vector.
pub fn eram(
    operator: &mut dyn TransportOperator,
    initial: MatRef<'_, f64>,
    config: &SolverConfig,
) -> Result<SolverOutput, ArnoldiError> {
    let config = SolverConfig {
        strategy: RestartStrategy::Explicit,
        ..*config
    };
    solve(operator, initial, &config)
}

/// Runs the implicitly restarted driver, compressing the factorization with
/// shifted-QR steps between cycles.
pub fn iram(
    operator: &mut dyn TransportOperator,
    initial: MatRef<'_, f64>,
    config: &SolverConfig,
) -> Result<SolverOutput, ArnoldiError> {
    let config = SolverConfig {
        strategy: RestartStrategy::Implicit,
        ..*config
    };
    solve(operator, initial, &config)
}
