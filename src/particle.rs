//! Neutron histories and the fission bank.
//!
//! A [`Particle`] is the unit of work of the Monte Carlo transport engine: a
//! position inside the slab, a direction cosine, and a signed statistical
//! weight. Negative weights are legitimate here: intermediate Krylov vectors
//! are not sign-definite, and the sign rides along on the particles sampled
//! from them.
//!
//! A [`FissionBank`] is the ordered collection of particles making up one
//! generation's source ensemble. It is created empty, filled by sampling a
//! [`crate::source::FissionSource`], and consumed when the next generation's
//! source is scored.

use rand::Rng;

/// A single neutron in flight through the 1-D slab.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Position along the slab axis.
    pub position: f64,
    /// Direction cosine with respect to the slab axis, in `[-1, 1]`.
    pub direction: f64,
    /// Signed statistical weight.
    pub weight: f64,
}

impl Particle {
    /// Creates a particle at `position` with the given signed `weight` and an
    /// isotropically sampled direction.
    pub fn born<R: Rng + ?Sized>(position: f64, weight: f64, rng: &mut R) -> Self {
        let mut particle = Self {
            position,
            direction: 1.0,
            weight,
        };
        particle.sample_direction(rng);
        particle
    }

    /// Samples a flight distance from the exponential distribution with rate
    /// `total_xs` (the mean free path is `1/total_xs`) and advances the
    /// particle along its direction cosine.
    pub fn flight<R: Rng + ?Sized>(&mut self, total_xs: f64, rng: &mut R) {
        // `random()` yields [0, 1); flip it to (0, 1] so the log is finite.
        let xi: f64 = 1.0 - rng.random::<f64>();
        let distance = -xi.ln() / total_xs;
        self.position += distance * self.direction;
    }

    /// Applies the outcome of a collision: the weight becomes `new_weight`
    /// (the caller folds in the scattering ratio) and the direction is
    /// resampled isotropically.
    pub fn collide<R: Rng + ?Sized>(&mut self, new_weight: f64, rng: &mut R) {
        self.weight = new_weight;
        self.sample_direction(rng);
    }

    /// An isotropic angular distribution in slab geometry is uniform in the
    /// direction cosine.
    pub fn sample_direction<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.direction = 2.0 * rng.random::<f64>() - 1.0;
    }
}

/// An ordered multiset of particles belonging to one transport generation.
#[derive(Debug, Clone, Default)]
pub struct FissionBank {
    particles: Vec<Particle>,
}

impl FissionBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            particles: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, particle: Particle) {
        self.particles.push(particle);
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Sum of the signed particle weights.
    pub fn total_weight(&self) -> f64 {
        self.particles.iter().map(|p| p.weight).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.particles.iter()
    }
}

impl<'a> IntoIterator for &'a FissionBank {
    type Item = &'a Particle;
    type IntoIter = std::slice::Iter<'a, Particle>;

    fn into_iter(self) -> Self::IntoIter {
        self.particles.iter()
    }
}

impl IntoIterator for FissionBank {
    type Item = Particle;
    type IntoIter = std::vec::IntoIter<Particle>;

    fn into_iter(self) -> Self::IntoIter {
        self.particles.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn flight_moves_along_direction() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut p = Particle {
            position: 0.0,
            direction: 1.0,
            weight: 1.0,
        };
        p.flight(2.0, &mut rng);
        assert!(p.position > 0.0);

        p.direction = -1.0;
        let before = p.position;
        p.flight(2.0, &mut rng);
        assert!(p.position < before);
    }

    #[test]
    fn mean_flight_distance_matches_mean_free_path() {
        let mut rng = StdRng::seed_from_u64(42);
        let total_xs = 2.0;
        let n = 200_000;
        let mut total = 0.0;
        for _ in 0..n {
            let mut p = Particle {
                position: 0.0,
                direction: 1.0,
                weight: 1.0,
            };
            p.flight(total_xs, &mut rng);
            total += p.position;
        }
        let mean = total / n as f64;
        // Mean free path is 1/total_xs = 0.5; the standard error at 2e5
        // samples is about 1.1e-3.
        assert!((mean - 0.5).abs() < 5e-3, "mean flight {mean}");
    }

    #[test]
    fn direction_cosine_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut p = Particle::born(0.0, 1.0, &mut rng);
        for _ in 0..1000 {
            p.sample_direction(&mut rng);
            assert!((-1.0..=1.0).contains(&p.direction));
        }
    }

    #[test]
    fn bank_tracks_signed_weight() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut bank = FissionBank::new();
        bank.push(Particle::born(0.1, 1.0, &mut rng));
        bank.push(Particle::born(0.2, -1.0, &mut rng));
        bank.push(Particle::born(0.3, 1.0, &mut rng));
        assert_eq!(bank.len(), 3);
        assert!((bank.total_weight() - 1.0).abs() < 1e-15);
    }
}
