use thiserror::Error;

/// Failure to assemble a usable [`crate::AimsConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A TOML file or environment variable could not be read or typed.
    #[error("cannot load AIMS configuration: {0}")]
    Figment(#[from] figment::Error),

    #[error("[{section}] has no usable value; set it in config.toml or through AIMS_ variables")]
    NotConfigured { section: String },

    /// A value parsed but is outside what the resolver, validator, or
    /// committer accepts.
    #[error("{field} = {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
