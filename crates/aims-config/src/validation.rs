//! Validation engine limits.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const fn default_percentage_tolerance() -> f64 {
    0.01
}

const fn default_max_period_days() -> i64 {
    366
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationConfig {
    /// Allowed deviation from 100 when summing a percentage group.
    #[serde(default = "default_percentage_tolerance")]
    pub percentage_tolerance: f64,

    /// Longest budget or result period, inclusive of both ends.
    #[serde(default = "default_max_period_days")]
    pub max_period_days: i64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            percentage_tolerance: default_percentage_tolerance(),
            max_period_days: default_max_period_days(),
        }
    }
}

impl ValidationConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(self.percentage_tolerance >= 0.0) {
            return Err(ConfigError::invalid(
                "validation.percentage_tolerance",
                "must not be negative",
            ));
        }
        if self.max_period_days <= 0 {
            return Err(ConfigError::invalid(
                "validation.max_period_days",
                "must be at least one day",
            ));
        }
        Ok(())
    }
}
