//! The Markov transport cycle: one application of the transport operator.
//!
//! A [`TransportCycle`] realizes the action of the (implicit) linear
//! transport operator `A` on a source vector by brute force: sample a fixed
//! number of particle histories from the source, follow each one through its
//! random walk of flights and collisions, and score fission production into
//! the next-generation source. The result is an unbiased but noisy estimate
//! of `A q`, with noise of order `1/sqrt(histories)`.
//!
//! Krylov vectors have mixed sign, which a physical transport sweep cannot
//! represent directly. Two sign policies are supported via [`SignTreatment`]:
//! transporting the positive and negative parts separately, or transporting
//! the magnitude once with per-particle signs.
//!
//! The engine never returns anything from an individual history; it
//! communicates only through the scoring callback and the cycle tallies.

use faer::{Mat, Scale};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::error::{ArnoldiError, ArnoldiErrorKind};
use crate::geometry::{CrossSection, Geometry};
use crate::particle::Particle;
use crate::source::FissionSource;

/// Weight magnitude below which Russian roulette is played.
pub const WEIGHT_CUTOFF: f64 = 0.2;

/// Kill probability for Russian roulette. Survivors have their weight scaled
/// by `1/(1 - P_KILL)`, preserving the expected weight.
pub const P_KILL: f64 = 0.2;

/// How a mixed-sign source vector is fed through the transport engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignTreatment {
    /// Decompose `q = q+ - q-`, transport each non-negative part with the
    /// full history count, scale each result by its part's total weight over
    /// the history count, and recombine.
    Split,
    /// Sample particles from `|q|` with the sign carried per particle and
    /// transport once, rescaling by `sum(|q|)/histories`. This is the cheaper
    /// policy and the default.
    #[default]
    Single,
}

/// Per-cycle event counters. Leakages and roulette kills are the normal ways
/// a history ends; they are tallied, never raised as errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleTallies {
    /// Histories that escaped through the left slab boundary.
    pub left_leakage: u64,
    /// Histories that escaped through the right slab boundary.
    pub right_leakage: u64,
    /// Histories terminated by Russian roulette.
    pub roulette_kills: u64,
}

/// One Monte Carlo transport generation over a slab.
///
/// The cycle owns its random stream; the seed is an explicit constructor
/// parameter, so the same seed and history count reproduce the same noisy
/// operator realization.
#[derive(Debug, Clone)]
pub struct TransportCycle {
    geometry: Geometry,
    xs: CrossSection,
    histories: usize,
    sign_treatment: SignTreatment,
    rng: StdRng,
    tallies: CycleTallies,
}

impl TransportCycle {
    /// Creates a transport cycle running `histories` particle histories per
    /// operator application. Fails fast if `histories` is zero.
    pub fn new(
        geometry: Geometry,
        xs: CrossSection,
        histories: usize,
        sign_treatment: SignTreatment,
        seed: u64,
    ) -> Result<Self, ArnoldiError> {
        if histories == 0 {
            return Err(ArnoldiErrorKind::InvalidInput(
                "histories must be greater than zero".into(),
            )
            .into());
        }
        Ok(Self {
            geometry,
            xs,
            histories,
            sign_treatment,
            rng: StdRng::seed_from_u64(seed),
            tallies: CycleTallies::default(),
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn histories(&self) -> usize {
        self.histories
    }

    /// Counters accumulated over every history tracked so far.
    pub fn tallies(&self) -> CycleTallies {
        self.tallies
    }

    /// Applies the transport operator to `q`, producing a noisy estimate of
    /// `A q` with `E[apply(q)] = A q`.
    pub fn apply(&mut self, q: &FissionSource) -> FissionSource {
        match self.sign_treatment {
            SignTreatment::Split => self.apply_split(q),
            SignTreatment::Single => self.apply_single(q),
        }
    }

    /// Split-sign policy: each sign-definite part is transported on its own
    /// and the signed results are recombined. A part with no weight
    /// contributes a zero vector outright, never a division by its zero
    /// total.
    fn apply_split(&mut self, q: &FissionSource) -> FissionSource {
        let (q_pos, q_neg) = q.split_signs();

        let next_pos = self.transport_part(&q_pos);
        let next_neg = self.transport_part(&q_neg);

        let combined: Mat<f64> = next_pos.column() - next_neg.column();
        FissionSource::from_parts(combined, self.geometry.clone())
    }

    fn transport_part(&mut self, part: &FissionSource) -> FissionSource {
        let total = part.total_weight();
        if total <= 0.0 {
            return FissionSource::zeros(self.geometry.clone());
        }
        let bank = part.sample(self.histories, &mut self.rng);
        let mut next = FissionSource::zeros(self.geometry.clone());
        for particle in bank {
            self.track_history(particle, &mut next);
        }
        let scaled: Mat<f64> = next.column() * Scale(total / self.histories as f64);
        FissionSource::from_parts(scaled, self.geometry.clone())
    }

    /// Single-source policy: one sweep over `|q|` with signed particle
    /// weights.
    fn apply_single(&mut self, q: &FissionSource) -> FissionSource {
        let abs_sum = q.abs_sum();
        if abs_sum == 0.0 {
            return FissionSource::zeros(self.geometry.clone());
        }
        let bank = q.sample(self.histories, &mut self.rng);
        let mut next = FissionSource::zeros(self.geometry.clone());
        for particle in bank {
            self.track_history(particle, &mut next);
        }
        let scaled: Mat<f64> = next.column() * Scale(abs_sum / self.histories as f64);
        FissionSource::from_parts(scaled, self.geometry.clone())
    }

    /// Follows one particle from birth to leakage, roulette kill, or weight
    /// exhaustion, scoring fission production at every collision site.
    ///
    /// The fission score at a collision is `w * nu * sigma_f / sigma_t`: the
    /// expected number of fission neutrons produced per collision, weighted
    /// by the particle. This is the only place the eigenvalue problem's
    /// physics enters the solver.
    fn track_history(&mut self, mut particle: Particle, next: &mut FissionSource) {
        let total_xs = self.xs.total();
        let fission_yield = self.xs.nu() * self.xs.fission() / total_xs;
        let scatter_ratio = self.xs.scatter() / total_xs;

        loop {
            particle.flight(total_xs, &mut self.rng);

            if particle.position < self.geometry.x_min() {
                self.tallies.left_leakage += 1;
                return;
            }
            if particle.position > self.geometry.x_max() {
                self.tallies.right_leakage += 1;
                return;
            }

            // Collision: score with the pre-collision weight, then reduce
            // the weight by the scattering ratio and resample the direction.
            next.score(particle.weight * fission_yield, particle.position);
            let new_weight = particle.weight * scatter_ratio;
            particle.collide(new_weight, &mut self.rng);

            if particle.weight == 0.0 {
                return;
            }
            if particle.weight.abs() < WEIGHT_CUTOFF && !self.roulette(&mut particle) {
                return;
            }
        }
    }

    /// Russian roulette: kill with probability [`P_KILL`], otherwise rescale
    /// the weight so the expectation is untouched. Returns whether the
    /// particle survived.
    fn roulette(&mut self, particle: &mut Particle) -> bool {
        if self.rng.random::<f64>() < P_KILL {
            self.tallies.roulette_kills += 1;
            false
        } else {
            particle.weight /= 1.0 - P_KILL;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slab(bins: usize) -> (Geometry, CrossSection) {
        let geometry = Geometry::new(bins, 0.0, 10.0).unwrap();
        let xs = CrossSection::new(0.5, 0.5, 0.0, 1.0).unwrap();
        (geometry, xs)
    }

    #[test]
    fn zero_histories_is_rejected() {
        let (geometry, xs) = slab(10);
        assert!(TransportCycle::new(geometry, xs, 0, SignTreatment::Single, 1).is_err());
    }

    #[test]
    fn same_seed_reproduces_cycle() {
        let (geometry, xs) = slab(10);
        let source = FissionSource::uniform(geometry.clone());

        let mut a = TransportCycle::new(geometry.clone(), xs, 2000, SignTreatment::Single, 99)
            .unwrap();
        let mut b =
            TransportCycle::new(geometry, xs, 2000, SignTreatment::Single, 99).unwrap();

        let qa = a.apply(&source);
        let qb = b.apply(&source);
        assert_eq!(qa.column(), qb.column());
        assert_eq!(a.tallies(), b.tallies());
    }

    #[test]
    fn zero_source_yields_zero_contribution() {
        let (geometry, xs) = slab(10);
        let zero = FissionSource::zeros(geometry.clone());
        for treatment in [SignTreatment::Split, SignTreatment::Single] {
            let mut cycle =
                TransportCycle::new(geometry.clone(), xs, 1000, treatment, 7).unwrap();
            let next = cycle.apply(&zero);
            assert_eq!(next.abs_sum(), 0.0);
        }
    }

    #[test]
    fn leakage_is_tallied_not_raised() {
        // A thin slab leaks most histories.
        let geometry = Geometry::new(4, 0.0, 0.1).unwrap();
        let xs = CrossSection::new(0.5, 0.5, 0.0, 1.0).unwrap();
        let source = FissionSource::uniform(geometry.clone());
        let mut cycle =
            TransportCycle::new(geometry, xs, 1000, SignTreatment::Single, 13).unwrap();
        cycle.apply(&source);
        let tallies = cycle.tallies();
        assert!(tallies.left_leakage + tallies.right_leakage > 500);
    }

    /// The split-sign and single-source policies estimate the same operator:
    /// their results on the same mixed-sign vector must agree within the
    /// Monte Carlo noise of the larger of the two runs.
    #[test]
    fn sign_policies_agree_in_expectation() {
        let (geometry, xs) = slab(5);
        let col = faer::mat![[1.0], [-0.5], [0.75], [-0.25], [0.5]];
        let source = FissionSource::from_column(col.as_ref(), geometry.clone()).unwrap();

        let runs = 60;
        let histories = 4000;
        let mut mean_split = Mat::<f64>::zeros(5, 1);
        let mut mean_single = Mat::<f64>::zeros(5, 1);
        for seed in 0..runs {
            let mut split =
                TransportCycle::new(geometry.clone(), xs, histories, SignTreatment::Split, seed)
                    .unwrap();
            let mut single = TransportCycle::new(
                geometry.clone(),
                xs,
                histories,
                SignTreatment::Single,
                seed + 1000,
            )
            .unwrap();
            mean_split = mean_split + split.apply(&source).column();
            mean_single = mean_single + single.apply(&source).column();
        }
        let scale = Scale(1.0 / runs as f64);
        let diff: Mat<f64> = mean_split * scale - mean_single * scale;
        assert!(diff.norm_l2() < 0.05, "policy disagreement {}", diff.norm_l2());
    }
}
