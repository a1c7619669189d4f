use crate::env::{
    env_or, LOG_SHIPPER_BRANCH_ENV, LOG_SHIPPER_COMMIT_ENV, LOG_SHIPPER_DEBUG_ENV,
    LOG_SHIPPER_ENV_NAME_ENV, LOG_SHIPPER_LEVEL_ENV,
};
use serde::{Deserialize, Serialize};

/// Settings for [`Logger::new`](crate::logger::Logger::new).
///
/// **Fields**
/// - `debug`: render human-readable colored lines instead of JSON.
/// - `min_level`: least severe level that is emitted (`DEBUG`, `INFO`,
///   `WARNING`, `ERROR`, `PANIC`; case-insensitive).
/// - `env_name`, `branch`, `commit`: attached to every record as baseline
///   fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub debug: bool,
    pub min_level: String,
    pub env_name: String,
    pub branch: String,
    pub commit: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            debug: false,
            min_level: "INFO".to_string(),
            env_name: String::new(),
            branch: String::new(),
            commit: String::new(),
        }
    }
}

impl LoggerConfig {
    /// Read the configuration from `LOG_SHIPPER_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            debug: matches!(
                env_or(LOG_SHIPPER_DEBUG_ENV, "false").to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            ),
            min_level: env_or(LOG_SHIPPER_LEVEL_ENV, &defaults.min_level),
            env_name: env_or(LOG_SHIPPER_ENV_NAME_ENV, ""),
            branch: env_or(LOG_SHIPPER_BRANCH_ENV, ""),
            commit: env_or(LOG_SHIPPER_COMMIT_ENV, ""),
        }
    }
}
