//! Command-line configuration.
//!
//! Loaded via the `config` crate from `FLOWPATCH__`-prefixed environment
//! variables, e.g. `FLOWPATCH__PRETTY=false` or
//! `FLOWPATCH__ENGINE__MAX_OPERATIONS=200`.

use config::{Config, ConfigError, Environment};
use flowpatch_workflow::EngineOptions;
use serde::Deserialize;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "FLOWPATCH";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CliConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Pretty-print JSON output.
    #[serde(default = "default_pretty")]
    pub pretty: bool,

    #[serde(default)]
    pub engine: EngineOptions,
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_pretty() -> bool {
    true
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            pretty: default_pretty(),
            engine: EngineOptions::default(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed into its field.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::with_prefix(ENV_PREFIX))
    }

    fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(environment.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}
