//! The operator capability at the heart of the matrix-free design.
//!
//! The Arnoldi core never sees a matrix; its fundamental operation is
//! "apply the operator to this vector". [`TransportOperator`] formalizes
//! that contract, and the three implementations cover the spectrum from
//! exact to fully stochastic:
//!
//! 1. [`DenseOperator`]: an explicit matrix product. This is the
//!    deterministic limit used to verify the numerical core against known
//!    eigenvalues.
//! 2. [`NoisyOperator`]: an explicit matrix product plus additive sampling
//!    noise of a chosen shape. It mimics the statistical character of Monte
//!    Carlo estimates while keeping the underlying operator exact, which
//!    makes it the right tool for studying how noise degrades the Krylov
//!    process.
//! 3. [`MonteCarloOperator`]: the production operator, a full particle
//!    transport cycle per application ([`crate::markov::TransportCycle`]).
//!
//! Unlike a plain matrix product, a stochastic application advances the
//! operator's random stream, so `apply` takes `&mut self`.

use faer::{Mat, MatRef, Scale};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};

use crate::error::{ArnoldiError, ArnoldiErrorKind};
use crate::markov::TransportCycle;
use crate::source::FissionSource;

/// A linear operator defined by its action on a column vector.
///
/// Implementations must be square: the result of `apply` has `len()` rows,
/// and the input must have `len()` rows. `apply` checks this and reports a
/// dimension mismatch rather than panicking, since a mismatch at this seam
/// is a configuration error, not a programming bug in the core.
pub trait TransportOperator {
    /// Dimension of the space the operator acts on.
    fn len(&self) -> usize;

    /// Whether the operator acts on a zero-dimensional space. Never true for
    /// a validated operator.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies the operator to `q`, returning (an estimate of) `A q`.
    fn apply(&mut self, q: MatRef<'_, f64>) -> Result<Mat<f64>, ArnoldiError>;
}

pub(crate) fn check_dimensions(
    operator_len: usize,
    q: MatRef<'_, f64>,
) -> Result<(), ArnoldiError> {
    if q.nrows() != operator_len || q.ncols() != 1 {
        return Err(ArnoldiErrorKind::DimensionMismatch {
            operator_len,
            vector_rows: q.nrows(),
        }
        .into());
    }
    Ok(())
}

/// An exact operator backed by a dense square matrix.
#[derive(Debug, Clone)]
pub struct DenseOperator {
    matrix: Mat<f64>,
}

impl DenseOperator {
    /// Wraps a square matrix. Fails on a non-square input.
    pub fn new(matrix: Mat<f64>) -> Result<Self, ArnoldiError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(ArnoldiErrorKind::InvalidInput(format!(
                "operator matrix must be square, got {}x{}",
                matrix.nrows(),
                matrix.ncols()
            ))
            .into());
        }
        Ok(Self { matrix })
    }

    /// The diagonal matrix `diag(1, 2, ..., n)`, a standard test operator
    /// with known spectrum.
    pub fn counting_diagonal(n: usize) -> Self {
        let matrix = Mat::from_fn(n, n, |i, j| if i == j { (i + 1) as f64 } else { 0.0 });
        Self { matrix }
    }

    pub fn matrix(&self) -> MatRef<'_, f64> {
        self.matrix.as_ref()
    }
}

impl TransportOperator for DenseOperator {
    fn len(&self) -> usize {
        self.matrix.nrows()
    }

    fn apply(&mut self, q: MatRef<'_, f64>) -> Result<Mat<f64>, ArnoldiError> {
        check_dimensions(self.len(), q)?;
        Ok(&self.matrix * q)
    }
}

/// The shape of the additive noise applied by [`NoisyOperator`].
///
/// Both shapes are zero-mean, so the noisy operator remains unbiased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseShape {
    /// Gaussian noise with standard deviation equal to the amplitude.
    Normal,
    /// Uniform noise on `[-amplitude/2, amplitude/2]`.
    Uniform,
}

/// An exact operator perturbed by independent additive noise per component.
#[derive(Debug, Clone)]
pub struct NoisyOperator {
    inner: DenseOperator,
    amplitude: f64,
    shape: NoiseShape,
    normal: Normal<f64>,
    rng: StdRng,
}

impl NoisyOperator {
    /// Wraps `matrix` with additive noise of the given shape and amplitude.
    /// The seed is explicit; the same seed reproduces the same noise stream.
    pub fn new(
        matrix: Mat<f64>,
        amplitude: f64,
        shape: NoiseShape,
        seed: u64,
    ) -> Result<Self, ArnoldiError> {
        if !amplitude.is_finite() || amplitude < 0.0 {
            return Err(ArnoldiErrorKind::InvalidInput(format!(
                "noise amplitude must be finite and non-negative, got {amplitude}"
            ))
            .into());
        }
        let normal = Normal::new(0.0, amplitude).map_err(|e| {
            ArnoldiError::from(ArnoldiErrorKind::InvalidInput(format!(
                "invalid noise amplitude {amplitude}: {e}"
            )))
        })?;
        Ok(Self {
            inner: DenseOperator::new(matrix)?,
            amplitude,
            shape,
            normal,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    fn noise(&mut self) -> f64 {
        match self.shape {
            NoiseShape::Normal => self.normal.sample(&mut self.rng),
            NoiseShape::Uniform => (self.rng.random::<f64>() - 0.5) * self.amplitude,
        }
    }
}

impl TransportOperator for NoisyOperator {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn apply(&mut self, q: MatRef<'_, f64>) -> Result<Mat<f64>, ArnoldiError> {
        let mut result = self.inner.apply(q)?;
        for i in 0..result.nrows() {
            result[(i, 0)] += self.noise();
        }
        Ok(result)
    }
}

/// The production operator: each application runs one Monte Carlo transport
/// generation, converting between bare columns and [`FissionSource`] at the
/// boundary.
#[derive(Debug, Clone)]
pub struct MonteCarloOperator {
    cycle: TransportCycle,
}

impl MonteCarloOperator {
    pub fn new(cycle: TransportCycle) -> Self {
        Self { cycle }
    }

    pub fn cycle(&self) -> &TransportCycle {
        &self.cycle
    }
}

impl TransportOperator for MonteCarloOperator {
    fn len(&self) -> usize {
        self.cycle.geometry().bins()
    }

    fn apply(&mut self, q: MatRef<'_, f64>) -> Result<Mat<f64>, ArnoldiError> {
        check_dimensions(self.len(), q)?;
        let source = FissionSource::from_column(q, self.cycle.geometry().clone())?;
        Ok(self.cycle.apply(&source).into_column())
    }
}

/// Empirically estimates the dense matrix of an operator by averaging
/// repeated applications to each basis vector.
///
/// This is a diagnostic tool: for a stochastic operator it converges to the
/// deterministic `A` as `rounds * histories` grows, giving an independent
/// benchmark for the dominant eigenvalue.
pub fn estimate_matrix(
    operator: &mut dyn TransportOperator,
    rounds: usize,
) -> Result<Mat<f64>, ArnoldiError> {
    if rounds == 0 {
        return Err(ArnoldiErrorKind::InvalidInput(
            "at least one estimation round is required".into(),
        )
        .into());
    }
    let n = operator.len();
    let mut accum = Mat::<f64>::zeros(n, n);
    for _ in 0..rounds {
        for j in 0..n {
            let e_j = Mat::from_fn(n, 1, |i, _| if i == j { 1.0 } else { 0.0 });
            let column = operator.apply(e_j.as_ref())?;
            for i in 0..n {
                accum[(i, j)] += column[(i, 0)];
            }
        }
    }
    Ok(accum * Scale(1.0 / rounds as f64))
}
