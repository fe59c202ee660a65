//! Configuration module for the pipeline sweeper.
//!
//! The sweeper can be configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax. Command line flags and
//! their environment variables override file values.
//!
//! # Example
//!
//! ```toml
//! [api]
//! root_url = "https://gitlab.example/api/v4"
//! project_id = "group/project"
//! token = "${CI_CLEANUP_TOKEN}"
//!
//! [retention]
//! per_page = 100
//! remove_before = "2 weeks"
//!
//! [observability.logging]
//! level = "info"
//! format = "compact"
//! ```

mod api;
mod observability;
mod retention;

use std::{path::Path, sync::LazyLock};

pub use api::*;
pub use observability::*;
use regex::Regex;
pub use retention::*;
use serde::{Deserialize, Serialize};

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Root configuration for the sweeper.
///
/// All sections are optional with sensible defaults; only the project and
/// token must come from somewhere (file, flag or environment).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweeperConfig {
    /// CI API connection settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Retention window and page size.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Observability configuration (logging).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl SweeperConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: SweeperConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the sections that have defaults.
    ///
    /// Project and token are checked separately by
    /// [`validate_for_sweep`](Self::validate_for_sweep), since they are
    /// usually supplied on the command line.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api.validate()?;
        self.retention.validate()?;
        Ok(())
    }

    /// Validate everything a sweep needs, after overrides have been applied.
    pub fn validate_for_sweep(&self) -> Result<(), ConfigError> {
        self.validate()?;
        self.api.pipelines_url()?;
        if self.token().is_none() {
            return Err(ConfigError::Validation("api.token is required".into()));
        }
        Ok(())
    }

    /// Non-empty token, if configured.
    pub fn token(&self) -> Option<&str> {
        self.api.token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips commented lines (lines where content before the variable is a comment).
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in ENV_VAR.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
