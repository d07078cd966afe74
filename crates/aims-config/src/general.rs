//! General application configuration.

use serde::{Deserialize, Serialize};

/// Default cap on skipped/failed entries kept on a committed session.
const fn default_error_log_limit() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Directory for per-session JSONL commit trails. Empty disables trails.
    #[serde(default)]
    pub trail_dir: String,

    #[serde(default = "default_error_log_limit")]
    pub error_log_limit: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            trail_dir: String::new(),
            error_log_limit: default_error_log_limit(),
        }
    }
}

impl GeneralConfig {
    #[must_use]
    pub fn trail_enabled(&self) -> bool {
        !self.trail_dir.trim().is_empty()
    }
}
