//! Retention window configuration.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! per_page = 50
//! remove_before = "30 days"
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::sweeper::{MAX_PAGE_SIZE, RetentionCutoff};

/// Which pipelines are removed and how many are listed per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Records returned by one listing call (max 100).
    /// Default: 100
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Pipelines last updated before this point are removed. Accepts a
    /// relative window (`"1 week"`, `"3 days ago"`) or an absolute date.
    /// Default: "1 week"
    #[serde(default = "default_remove_before")]
    pub remove_before: String,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            remove_before: default_remove_before(),
        }
    }
}

fn default_per_page() -> u32 {
    MAX_PAGE_SIZE
}

fn default_remove_before() -> String {
    "1 week".to_string()
}

impl RetentionConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.per_page) {
            return Err(ConfigError::Validation(format!(
                "retention.per_page must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.per_page
            )));
        }
        RetentionCutoff::resolve(Some(&self.remove_before))
            .map_err(|e| ConfigError::Validation(format!("retention.remove_before: {e}")))?;
        Ok(())
    }
}
