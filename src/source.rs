//! Discretized fission source densities.
//!
//! A [`FissionSource`] is a histogram over the geometry mesh. It plays two
//! roles at once: physically it is the probability density of fission sites,
//! and algebraically it is the vector the Arnoldi process operates on. The
//! two roles meet in `sample` (density to particle ensemble) and `score` /
//! `from_bank` (particle ensemble back to density).
//!
//! Because Krylov vectors are signed, the density entries may be negative;
//! sampling draws from the magnitude of the density and carries the bin sign
//! on each particle's weight. Sampling uses Walker's alias method (Kronmal
//! and Peterson's construction), which costs O(n) to set up and O(1) per
//! draw.

use faer::{Mat, MatRef};
use rand::Rng;

use crate::error::{ArnoldiError, ArnoldiErrorKind};
use crate::geometry::Geometry;
use crate::particle::{FissionBank, Particle};

/// Alias table over a discrete distribution with `n` outcomes.
///
/// After construction, each draw costs a single uniform variate and at most
/// one comparison.
#[derive(Debug, Clone)]
pub(crate) struct AliasTable {
    alias: Vec<usize>,
    cutoff: Vec<f64>,
}

impl AliasTable {
    /// Builds the table from non-negative outcome weights. The weights need
    /// not be normalized; they must not all be zero.
    pub(crate) fn new(weights: &[f64]) -> Self {
        let n = weights.len();
        let total: f64 = weights.iter().sum();

        // Scaled probabilities with mean 1.
        let mut cutoff: Vec<f64> = weights.iter().map(|w| w * n as f64 / total).collect();
        let mut alias: Vec<usize> = (0..n).collect();

        // Partition outcomes into those below and above the mean.
        let mut small: Vec<usize> = Vec::new();
        let mut large: Vec<usize> = Vec::new();
        for (i, &c) in cutoff.iter().enumerate() {
            if c < 1.0 {
                small.push(i);
            } else {
                large.push(i);
            }
        }

        // Pair a deficient outcome with a surplus one until either stack
        // runs out; floating-point residue leaves the leftovers at cutoff 1.
        while let (Some(j), Some(k)) = (small.pop(), large.pop()) {
            alias[j] = k;
            cutoff[k] += cutoff[j] - 1.0;
            if cutoff[k] < 1.0 {
                small.push(k);
            } else {
                large.push(k);
            }
        }

        Self { alias, cutoff }
    }

    /// Draws one outcome index.
    pub(crate) fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let u: f64 = rng.random::<f64>() * self.alias.len() as f64;
        let i = (u as usize).min(self.alias.len() - 1);
        if u - (i as f64) < self.cutoff[i] {
            i
        } else {
            self.alias[i]
        }
    }
}

/// A signed histogram density over the bins of one [`Geometry`].
#[derive(Debug, Clone)]
pub struct FissionSource {
    density: Mat<f64>,
    geometry: Geometry,
}

impl FissionSource {
    /// An all-zero source over `geometry`.
    pub fn zeros(geometry: Geometry) -> Self {
        let density = Mat::zeros(geometry.bins(), 1);
        Self { density, geometry }
    }

    /// A flat (uniform) source, the usual starting guess.
    pub fn uniform(geometry: Geometry) -> Self {
        let density = Mat::from_fn(geometry.bins(), 1, |_, _| 1.0);
        Self { density, geometry }
    }

    /// Wraps an existing column vector as a source over `geometry`.
    ///
    /// Fails if the column length does not match the bin count; this is the
    /// dimension check guarding the seam between the linear-algebra core and
    /// the transport engine.
    pub fn from_column(column: MatRef<'_, f64>, geometry: Geometry) -> Result<Self, ArnoldiError> {
        if column.nrows() != geometry.bins() || column.ncols() != 1 {
            return Err(ArnoldiErrorKind::DimensionMismatch {
                operator_len: geometry.bins(),
                vector_rows: column.nrows(),
            }
            .into());
        }
        Ok(Self {
            density: column.to_owned(),
            geometry,
        })
    }

    /// Wraps a column already known to match the geometry. Internal to the
    /// transport engine, which only builds outputs over its own mesh.
    pub(crate) fn from_parts(density: Mat<f64>, geometry: Geometry) -> Self {
        debug_assert_eq!(density.nrows(), geometry.bins());
        Self { density, geometry }
    }

    /// Bins a fission bank into a histogram source, one unit of density per
    /// particle with the particle's weight sign.
    pub fn from_bank(bank: &FissionBank, geometry: Geometry) -> Self {
        let mut source = Self::zeros(geometry);
        for particle in bank {
            let unit = if particle.weight < 0.0 { -1.0 } else { 1.0 };
            source.score(unit, particle.position);
        }
        source
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// The density as a column vector view.
    pub fn column(&self) -> MatRef<'_, f64> {
        self.density.as_ref()
    }

    pub fn into_column(self) -> Mat<f64> {
        self.density
    }

    pub fn bins(&self) -> usize {
        self.geometry.bins()
    }

    /// Sum of the positive part of the density.
    pub fn pos_source(&self) -> f64 {
        (0..self.bins())
            .map(|i| self.density[(i, 0)].max(0.0))
            .sum()
    }

    /// Magnitude of the negative part of the density.
    pub fn neg_source(&self) -> f64 {
        (0..self.bins())
            .map(|i| (-self.density[(i, 0)]).max(0.0))
            .sum()
    }

    /// Signed total weight of the density.
    pub fn total_weight(&self) -> f64 {
        (0..self.bins()).map(|i| self.density[(i, 0)]).sum()
    }

    /// Sum of |density|, the normalization constant for sampling.
    pub fn abs_sum(&self) -> f64 {
        (0..self.bins()).map(|i| self.density[(i, 0)].abs()).sum()
    }

    /// Splits the source into its non-negative positive and negative parts,
    /// `q = q_pos - q_neg`.
    pub fn split_signs(&self) -> (FissionSource, FissionSource) {
        let pos = Mat::from_fn(self.bins(), 1, |i, _| self.density[(i, 0)].max(0.0));
        let neg = Mat::from_fn(self.bins(), 1, |i, _| (-self.density[(i, 0)]).max(0.0));
        (
            Self {
                density: pos,
                geometry: self.geometry.clone(),
            },
            Self {
                density: neg,
                geometry: self.geometry.clone(),
            },
        )
    }

    /// Adds `weight` to the bin containing `position`. Positions outside the
    /// slab are ignored; the transport engine only scores at collision sites,
    /// which are inside by construction.
    pub fn score(&mut self, weight: f64, position: f64) {
        if let Some(bin) = self.geometry.bin_of(position) {
            self.density[(bin, 0)] += weight;
        }
    }

    /// Samples `n` particles from the magnitude of the density.
    ///
    /// Each particle is born uniformly within its drawn bin, with weight `+1`
    /// or `-1` according to the bin's sign and an isotropic direction. An
    /// all-zero density yields an empty bank, the explicit zero-contribution
    /// branch demanded of the transport cycle.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> FissionBank {
        if self.abs_sum() == 0.0 {
            return FissionBank::new();
        }

        let magnitudes: Vec<f64> = (0..self.bins()).map(|i| self.density[(i, 0)].abs()).collect();
        let table = AliasTable::new(&magnitudes);
        let edges = self.geometry.edges();

        let mut bank = FissionBank::with_capacity(n);
        for _ in 0..n {
            let bin = table.draw(rng);
            let position = rng.random_range(edges[bin]..edges[bin + 1]);
            let weight = if self.density[(bin, 0)] < 0.0 { -1.0 } else { 1.0 };
            bank.push(Particle::born(position, weight, rng));
        }
        bank
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn geometry(bins: usize) -> Geometry {
        Geometry::new(bins, 0.0, 1.0).unwrap()
    }

    #[test]
    fn alias_table_reproduces_distribution() {
        let mut rng = StdRng::seed_from_u64(11);
        let weights = [0.1, 0.4, 0.2, 0.3];
        let table = AliasTable::new(&weights);

        let n = 400_000;
        let mut counts = [0usize; 4];
        for _ in 0..n {
            counts[table.draw(&mut rng)] += 1;
        }
        for (i, &w) in weights.iter().enumerate() {
            let freq = counts[i] as f64 / n as f64;
            // Binomial standard error is below 1e-3 at this sample size.
            assert!((freq - w).abs() < 5e-3, "bin {i}: {freq} vs {w}");
        }
    }

    #[test]
    fn column_dimension_mismatch_is_rejected() {
        let col = Mat::<f64>::zeros(5, 1);
        assert!(FissionSource::from_column(col.as_ref(), geometry(4)).is_err());
    }

    #[test]
    fn sign_accounting() {
        let geo = geometry(4);
        let col = faer::mat![[1.0], [-2.0], [3.0], [-4.0]];
        let source = FissionSource::from_column(col.as_ref(), geo).unwrap();
        assert_eq!(source.pos_source(), 4.0);
        assert_eq!(source.neg_source(), 6.0);
        assert_eq!(source.total_weight(), -2.0);
        assert_eq!(source.abs_sum(), 10.0);

        let (pos, neg) = source.split_signs();
        assert_eq!(pos.column()[(1, 0)], 0.0);
        assert_eq!(neg.column()[(1, 0)], 2.0);
        assert_eq!(pos.total_weight(), 4.0);
        assert_eq!(neg.total_weight(), 6.0);
    }

    #[test]
    fn sampled_particles_carry_bin_signs() {
        let geo = geometry(2);
        let col = faer::mat![[1.0], [-1.0]];
        let source = FissionSource::from_column(col.as_ref(), geo).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let bank = source.sample(1000, &mut rng);
        assert_eq!(bank.len(), 1000);
        for p in &bank {
            if p.position < 0.5 {
                assert_eq!(p.weight, 1.0);
            } else {
                assert_eq!(p.weight, -1.0);
            }
        }
    }

    #[test]
    fn all_zero_source_samples_empty_bank() {
        let source = FissionSource::zeros(geometry(4));
        let mut rng = StdRng::seed_from_u64(5);
        assert!(source.sample(100, &mut rng).is_empty());
    }

    /// `from_bank(sample(N))` must reproduce the empirical density within
    /// Monte Carlo statistical error.
    #[test]
    fn sample_then_bin_round_trip() {
        let geo = geometry(5);
        let col = faer::mat![[0.1], [0.3], [0.2], [0.25], [0.15]];
        let source = FissionSource::from_column(col.as_ref(), geo.clone()).unwrap();

        let mut rng = StdRng::seed_from_u64(23);
        let n = 500_000;
        let bank = source.sample(n, &mut rng);
        let rebuilt = FissionSource::from_bank(&bank, geo);

        for i in 0..5 {
            let freq = rebuilt.column()[(i, 0)] / n as f64;
            let expected = col[(i, 0)];
            assert!(
                (freq - expected).abs() < 5e-3,
                "bin {i}: {freq} vs {expected}"
            );
        }
    }
}
