//! # Randomness - The Only Driver of "Emergence"
//!
//! Every engine draws its randomness from an injected [`RandomSource`]
//! so that runs can be replayed from a seed, or frozen entirely.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Pluggable pseudo-random source
pub trait RandomSource: Send + Sync {
    /// Uniform sample in [0, 1)
    fn next_f32(&mut self) -> f32;

    /// True with probability `p`
    fn chance(&mut self, p: f32) -> bool {
        self.next_f32() < p
    }

    /// Uniform sample in [lo, hi); returns `lo` for an empty range
    fn range(&mut self, lo: f32, hi: f32) -> f32 {
        if hi <= lo {
            return lo;
        }
        lo + (hi - lo) * self.next_f32()
    }

    /// Uniform index in 0..len (0 when len is 0)
    fn index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        ((self.next_f32() * len as f32) as usize).min(len - 1)
    }

    /// Symmetric delta in [-0.5, 0.5) scaled by `step`
    fn delta(&mut self, step: f32) -> f32 {
        (self.next_f32() - 0.5) * step
    }
}

/// Seedable source backed by `StdRng`
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    /// Deterministic source for a fixed seed
    pub fn from_seed(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Non-deterministic source
    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    /// Seeded when `seed` is set, entropy otherwise
    pub fn from_option(seed: Option<u64>) -> Self {
        match seed {
            Some(s) => Self::from_seed(s),
            None => Self::from_entropy(),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_f32(&mut self) -> f32 {
        self.rng.gen::<f32>()
    }
}

/// Always returns the same sample ("no randomness" mode for tests)
#[derive(Clone, Copy, Debug)]
pub struct ConstantRandom(f32);

impl ConstantRandom {
    pub fn new(value: f32) -> Self {
        // Keep the sample inside [0, 1) like a real source
        let v = if value.is_finite() { value.clamp(0.0, 0.999_999) } else { 0.5 };
        Self(v)
    }
}

impl RandomSource for ConstantRandom {
    fn next_f32(&mut self) -> f32 {
        self.0
    }
}

/// Boxed source for an optional seed
pub fn boxed(seed: Option<u64>) -> Box<dyn RandomSource> {
    Box::new(SeededRandom::from_option(seed))
}
