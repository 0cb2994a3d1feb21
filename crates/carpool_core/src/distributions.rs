//! Stochastic samplers: Poisson-process inter-arrival times and Weibull
//! patience draws.
//!
//! `rand_distr` is used here for `Weibull` rather than hand-rolling
//! inverse-transform sampling.

use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Weibull};

/// Exponential inter-arrival sampler: `-ln(u) / rate` seconds, drawn from
/// a fresh `StdRng` reseeded per call on `(seed, spawn_count)` so the
/// arrival stream is reproducible independent of draw order elsewhere.
pub struct ExponentialInterArrival {
    pub rate_per_sec: f64,
    pub seed: u64,
}

impl ExponentialInterArrival {
    pub fn sample_secs(&self, spawn_count: u64) -> f64 {
        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed.wrapping_add(spawn_count));
        let u: f64 = rng.gen::<f64>().max(1e-10);
        -u.ln() / self.rate_per_sec
    }
}

/// Draws a Weibull-distributed patience value in seconds from a caller-
/// supplied RNG. The RNG is shared (not reseeded per call) so that, within
/// one simulation run, successive patience draws form a single stream --
/// comparing two policies fairly depends on that stream being reset to
/// the same seed before the second policy's run, not on each draw being
/// independently reproducible.
pub fn sample_patience_secs<R: Rng + ?Sized>(rng: &mut R, shape: f64, scale: f64) -> f64 {
    Weibull::new(shape, scale)
        .expect("weibull shape/scale must be positive")
        .sample(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    #[test]
    fn exponential_sampler_is_reproducible_for_same_seed_and_count() {
        let a = ExponentialInterArrival { rate_per_sec: 0.1, seed: 42 };
        let b = ExponentialInterArrival { rate_per_sec: 0.1, seed: 42 };
        assert_eq!(a.sample_secs(5), b.sample_secs(5));
    }

    #[test]
    fn patience_sampler_reseeded_stream_matches() {
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        let a: Vec<f64> = (0..5).map(|_| sample_patience_secs(&mut rng_a, 1.5, 120.0)).collect();
        let b: Vec<f64> = (0..5).map(|_| sample_patience_secs(&mut rng_b, 1.5, 120.0)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn patience_samples_are_non_negative() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert!(sample_patience_secs(&mut rng, 1.5, 120.0) >= 0.0);
        }
    }
}
