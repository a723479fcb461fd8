//! Engine configuration.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;

/// Limits, randomness and template mapping for an [`crate::Engine`].
///
/// Every field has a default, so a partial TOML table is enough:
///
/// ```toml
/// seed = 42
/// max_template_attempts = 20
///
/// [templates]
/// "https://example.org/rp/custom" = "templates/custom.json"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_expression_depth: usize,
    pub max_rule_depth: usize,
    /// Upper bound on the values a single operator may build, e.g. `repeat`.
    pub max_container_size: usize,
    /// How many times template processing restarts after an unsatisfied
    /// `templateConstraint`.
    pub max_template_attempts: usize,
    /// Seed for `random`, `randomInteger` and `randomFloat`. Unseeded runs
    /// draw from OS entropy.
    pub seed: Option<u64>,
    /// Template URI → location, consulted before the `templateLocation` hint.
    pub templates: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_expression_depth: 256,
            max_rule_depth: 128,
            max_container_size: 100_000,
            max_template_attempts: 100,
            seed: None,
            templates: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// A fresh random source for one processing run.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}
