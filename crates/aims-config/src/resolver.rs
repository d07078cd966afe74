//! Entity resolver tuning.

use aims_core::resolution::ResolverSettings;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const fn default_fuzzy_threshold() -> f64 {
    0.6
}

const fn default_tie_epsilon() -> f64 {
    0.02
}

/// Which similarity strategy scores fuzzy matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityKind {
    #[default]
    Trigram,
    Levenshtein,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,

    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f64,

    #[serde(default)]
    pub similarity: SimilarityKind,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
            tie_epsilon: default_tie_epsilon(),
            similarity: SimilarityKind::default(),
        }
    }
}

impl ResolverConfig {
    #[must_use]
    pub const fn settings(&self) -> ResolverSettings {
        ResolverSettings {
            threshold: self.fuzzy_threshold,
            tie_epsilon: self.tie_epsilon,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fuzzy_threshold > 0.0 && self.fuzzy_threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "resolver.fuzzy_threshold",
                format!("{} is outside (0, 1]", self.fuzzy_threshold),
            ));
        }
        if !(0.0..1.0).contains(&self.tie_epsilon) {
            return Err(ConfigError::invalid(
                "resolver.tie_epsilon",
                format!("{} is outside [0, 1)", self.tie_epsilon),
            ));
        }
        Ok(())
    }
}
