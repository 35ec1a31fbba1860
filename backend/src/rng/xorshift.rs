//! Seeded sampler for random timer lengths (xorshift64*)

use serde::{Deserialize, Serialize};

const MULTIPLIER: u64 = 0x2545_F491_4F6C_DD1D;

/// Unit-interval scale: 53 mantissa bits
const UNIT_SCALE: f64 = 1.0 / (1u64 << 53) as f64;

/// Federation-wide generator behind every `RandomDuration` node
///
/// Replaying a scenario with the same seed samples the same lengths in the
/// same order.
///
/// # Example
/// ```
/// use federation_manager_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let length = rng.uniform(2.0, 5.0);
/// assert!((2.0..5.0).contains(&length));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngManager {
    seed: u64,
    state: u64,
}

impl RngManager {
    /// Seed the generator; zero maps to one since the zero state is a fixed point
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            state: seed.max(1),
        }
    }

    /// Seed the generator was created with
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Raw generator state
    pub fn state(&self) -> u64 {
        self.state
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut s = self.state;
        s ^= s >> 12;
        s ^= s << 25;
        s ^= s >> 27;
        self.state = s;
        s.wrapping_mul(MULTIPLIER)
    }

    /// Sample from `[0, 1)`
    pub fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * UNIT_SCALE
    }

    /// Sample from `[lower, upper)`
    ///
    /// `lower == upper` yields `lower` and leaves the state untouched.
    ///
    /// # Panics
    /// If a bound is not finite or `lower > upper`. Scenario loading rejects
    /// such bounds before a node can reach the sampler.
    pub fn uniform(&mut self, lower: f64, upper: f64) -> f64 {
        assert!(
            lower.is_finite() && upper.is_finite() && lower <= upper,
            "lower must not exceed upper"
        );
        if lower == upper {
            lower
        } else {
            lower + (upper - lower) * self.unit()
        }
    }
}
