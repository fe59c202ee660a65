use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Connection settings for the CI API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// API v4 root URL.
    /// Default: https://gitlab.com/api/v4
    #[serde(default = "default_root_url")]
    pub root_url: String,

    /// Numeric ID or full path (`group/project`) of the project.
    #[serde(default)]
    pub project_id: Option<String>,

    /// Private token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            root_url: default_root_url(),
            project_id: None,
            token: None,
        }
    }
}

fn default_root_url() -> String {
    "https://gitlab.com/api/v4".to_string()
}

impl ApiConfig {
    /// Collection URL of the project's pipelines.
    ///
    /// Project paths are URL-encoded so `group/project` becomes
    /// `group%2Fproject`, which the API accepts in place of a numeric ID.
    pub fn pipelines_url(&self) -> Result<String, ConfigError> {
        let project = self
            .project_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ConfigError::Validation("api.project_id is required".into()))?;

        let encoded: String = url::form_urlencoded::byte_serialize(project.as_bytes()).collect();
        Ok(format!(
            "{}/projects/{}/pipelines",
            self.root_url.trim_end_matches('/'),
            encoded
        ))
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.root_url).map_err(|e| {
            ConfigError::Validation(format!("api.root_url '{}' is invalid: {e}", self.root_url))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "api.root_url must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        Ok(())
    }
}
