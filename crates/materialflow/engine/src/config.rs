//! Engine configuration

use crate::evaluator::DEFAULT_MAX_RULE_DEPTH;
use materialflow_net::runtime::DEFAULT_MAX_CASCADE_STEPS;
use materialflow_types::IdStrategy;
use serde::{Deserialize, Serialize};

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How activation ids are minted
    #[serde(default)]
    pub ids: IdStrategy,

    /// Firing budget of one cascade
    #[serde(default = "default_max_cascade_steps")]
    pub max_cascade_steps: usize,

    /// Bound on rule nesting
    #[serde(default = "default_max_rule_depth")]
    pub max_rule_depth: usize,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ids: IdStrategy::default(),
            max_cascade_steps: DEFAULT_MAX_CASCADE_STEPS,
            max_rule_depth: DEFAULT_MAX_RULE_DEPTH,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_max_cascade_steps() -> usize {
    DEFAULT_MAX_CASCADE_STEPS
}

fn default_max_rule_depth() -> usize {
    DEFAULT_MAX_RULE_DEPTH
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&EngineConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // MATERIALFLOW_MAX_CASCADE_STEPS, MATERIALFLOW_LOGGING__LEVEL, ...
        builder = builder.add_source(
            config::Environment::with_prefix("MATERIALFLOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Deterministic ids, for tests and reproducible runs
    pub fn testing() -> Self {
        Self {
            ids: IdStrategy::Sequential,
            ..Default::default()
        }
    }
}
