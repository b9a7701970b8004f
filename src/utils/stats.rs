//! Running statistics over a stream of scalar samples.

/// Accumulates mean and spread of a sample stream without storing it.
///
/// Uses Welford's update, which is stable for the long low-variance streams
/// produced by converged restart cycles. The spread reported by [`std`] is
/// the population standard deviation (divide by `n`, not `n - 1`), matching
/// the convention used for the restart history plots, and [`std_of_mean`]
/// scales it by `1/sqrt(n)` to estimate the error of the accumulated mean.
///
/// [`std`]: RunningStats::std
/// [`std_of_mean`]: RunningStats::std_of_mean
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    sum_sq: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one sample into the accumulator.
    pub fn push(&mut self, sample: f64) {
        self.count += 1;
        let delta = sample - self.mean;
        self.mean += delta / self.count as f64;
        self.sum_sq += delta * (sample - self.mean);
    }

    /// Number of samples seen so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean of the samples, or zero before the first sample.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation of the samples.
    pub fn std(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_sq / self.count as f64).sqrt()
        }
    }

    /// Standard error of the accumulated mean.
    pub fn std_of_mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.std() / (self.count as f64).sqrt()
        }
    }
}
