//! Sources of randomness for flush delays and retry backoff.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Produces uniformly distributed samples in `[0, 1)`.
///
/// Flush delays and retry backoff are spread out with samples from this
/// source.  Supplying a fixed or seeded source makes their timing
/// reproducible.
pub trait JitterSource: Send + Sync {
    /// Returns the next sample in `[0, 1)`.
    fn sample(&self) -> f64;

    /// Picks a duration in `[min, max]`.
    fn between(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let sample = self.sample();
        let sample = if sample.is_nan() { 0.0 } else { sample.clamp(0.0, 1.0) };
        min + (max - min).mul_f64(sample)
    }
}

impl<F> JitterSource for F
where
    F: Fn() -> f64 + Send + Sync,
{
    fn sample(&self) -> f64 {
        self()
    }
}

/// Samples the thread local generator of `rand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// Samples a seeded generator, yielding the same sequence for the same seed.
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    /// Creates a source seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        SeededJitter {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl fmt::Debug for SeededJitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeededJitter").finish_non_exhaustive()
    }
}

impl JitterSource for SeededJitter {
    fn sample(&self) -> f64 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random::<f64>()
    }
}
