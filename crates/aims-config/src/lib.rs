//! # aims-config
//!
//! Layered configuration loading for AIMS using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`AIMS_` prefix, `__` as separator)
//! 2. Project-level `.aims/config.toml`
//! 3. User-level `~/.config/aims/config.toml`
//! 4. Built-in defaults
//!
//! Figment maps `AIMS_RESOLVER__FUZZY_THRESHOLD` -> `resolver.fuzzy_threshold`
//! and `AIMS_IMPORT__STRATEGIES__TRANSACTIONS` -> `import.strategies.transactions`.
//!
//! ```no_run
//! use aims_config::AimsConfig;
//!
//! let config = AimsConfig::load_with_dotenv().expect("config");
//! println!("database: {}", config.database.path);
//! ```

mod database;
mod error;
mod general;
mod import;
mod resolver;
mod validation;

pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use general::GeneralConfig;
pub use import::{ImportConfig, StrategyConfig};
pub use resolver::{ResolverConfig, SimilarityKind};
pub use validation::ValidationConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AimsConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub general: GeneralConfig,
}

impl AimsConfig {
    /// Load configuration from TOML files and environment variables, then
    /// check value ranges.
    ///
    /// Does not read `.env`; see [`Self::load_with_dotenv`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Figment` on malformed sources and
    /// `ConfigError::InvalidValue` on out-of-range values.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.env` from the workspace root first, then [`Self::load`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    #[must_use]
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".aims/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("AIMS_").split("__"))
    }

    /// Reject values the resolver, validator, or committer cannot use.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first bad field, or
    /// `ConfigError::NotConfigured` if the database path is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.database.is_configured() {
            return Err(ConfigError::NotConfigured {
                section: "database".into(),
            });
        }
        self.resolver.validate()?;
        self.validation.validate()?;
        if self.general.error_log_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "general.error_log_limit".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("aims").join("config.toml"))
    }

    /// Walks up from `CARGO_MANIFEST_DIR` (at most three levels) looking for
    /// `.env`, then falls back to the current directory. Missing files are
    /// ignored.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        let _ = dotenvy::dotenv();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aims_core::enums::{CollectionKind, CollectionStrategy};

    #[test]
    fn default_config_is_valid() {
        let config = AimsConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.database.path, "aims.db");
        assert!((config.resolver.fuzzy_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.validation.max_period_days, 366);
        assert_eq!(
            config.import.strategies.for_kind(CollectionKind::Results),
            CollectionStrategy::Replace
        );
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let mut config = AimsConfig::default();
        config.resolver.fuzzy_threshold = 0.0;
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "resolver.fuzzy_threshold")
        );
    }

    #[test]
    fn blank_database_path_is_not_configured() {
        let mut config = AimsConfig::default();
        config.database.path = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotConfigured { .. })
        ));
    }
}
