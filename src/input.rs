//! Seeded random input arrays
//!
//! Runs are driven by an array of small non-negative integers drawn uniformly from
//! `0..=max_value`. A fixed seed makes a run reproducible; without one the generator is seeded
//! from system entropy.

use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{try_with_capacity, Error, Result};
use crate::partition::GlobalArray;

/// Default largest value of a generated element
pub const DEFAULT_MAX_VALUE: i64 = 10;

/// Default array length
pub const DEFAULT_LEN: usize = 8;

/// How to generate the input of a run
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InputConfig {
    /// Number of elements
    pub len: usize,
    /// Largest value an element may take
    pub max_value: i64,
    /// Seed of the generator; `None` draws one from system entropy
    pub seed: Option<u64>,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            len: DEFAULT_LEN,
            max_value: DEFAULT_MAX_VALUE,
            seed: None,
        }
    }
}

impl InputConfig {
    /// An input of `len` elements with default bounds and no fixed seed
    pub fn new(len: usize) -> Self {
        InputConfig {
            len,
            ..InputConfig::default()
        }
    }

    /// Use a fixed seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Draw elements from `0..=max_value`
    pub fn max_value(mut self, max_value: i64) -> Self {
        self.max_value = max_value;
        self
    }
}

/// Generate a global array as described by `config`.
pub fn random_array(config: &InputConfig) -> Result<GlobalArray<i64>> {
    if config.max_value < 0 {
        return Err(Error::Config {
            key: "max_value",
            value: config.max_value.to_string(),
        });
    }
    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let between = Uniform::new_inclusive(0, config.max_value);
    let mut values = try_with_capacity(config.len)?;
    values.extend(between.sample_iter(&mut rng).take(config.len));
    Ok(GlobalArray::new(values))
}
