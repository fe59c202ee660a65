//! Resource API client.
//!
//! The sweeper only needs two calls against the remote service: list a page of
//! finished resources and delete one resource by id. [`ResourceApi`] is the
//! seam between the sweep loop and the transport; [`HttpResourceApi`] is the
//! reqwest implementation used in production.

use std::fmt;

use async_trait::async_trait;
use reqwest::{
    Client,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{ApiError, RetentionCutoff};

/// Header carrying the private token on every request.
pub const TOKEN_HEADER: &str = "private-token";

/// Largest page size the API accepts.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Opaque identifier of a remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceRef {
    Integer(u64),
    String(String),
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(id) => write!(f, "{id}"),
            Self::String(id) => f.write_str(id),
        }
    }
}

impl From<u64> for ResourceRef {
    fn from(id: u64) -> Self {
        Self::Integer(id)
    }
}

impl From<&str> for ResourceRef {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

/// One entry of a listing page. Fields other than these are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: ResourceRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl ResourceRecord {
    pub fn new(id: impl Into<ResourceRef>) -> Self {
        Self {
            id: id.into(),
            status: None,
            git_ref: None,
            updated_at: None,
        }
    }
}

/// Filter for one listing call.
///
/// The same query is reissued after every page: deleted resources leave the
/// filtered set, so the window moves without an explicit cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub per_page: u32,
    pub updated_before: RetentionCutoff,
}

impl ListQuery {
    pub const SCOPE: &'static str = "finished";
    pub const SORT: &'static str = "asc";

    pub fn new(per_page: u32, updated_before: RetentionCutoff) -> Self {
        Self {
            per_page,
            updated_before,
        }
    }

    /// Query string pairs in the order they are sent.
    pub fn as_pairs(&self) -> [(&'static str, String); 4] {
        [
            ("per_page", self.per_page.to_string()),
            ("scope", Self::SCOPE.to_string()),
            ("sort", Self::SORT.to_string()),
            ("updated_before", self.updated_before.as_query_param()),
        ]
    }
}

/// Listing and deletion calls against a remote resource collection.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Collection URL, used in log lines and error reports.
    fn base_url(&self) -> &str;

    /// Fetch one page of resources matching `query`.
    async fn list(&self, query: &ListQuery) -> Result<Vec<ResourceRecord>, ApiError>;

    /// Delete a single resource.
    async fn delete(&self, id: &ResourceRef) -> Result<(), ApiError>;
}

/// reqwest-backed [`ResourceApi`].
///
/// One client is built per sweep with the token installed as a default
/// header, so every call shares its connection pool.
#[derive(Debug, Clone)]
pub struct HttpResourceApi {
    client: Client,
    base_url: String,
    collection: Url,
}

impl HttpResourceApi {
    pub fn new(base_url: impl Into<String>, token: &str) -> Result<Self, ApiError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let collection = Url::parse(&base_url).map_err(|e| ApiError::InvalidUrl {
            url: base_url.clone(),
            message: e.to_string(),
        })?;
        if collection.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl {
                url: base_url,
                message: "URL has no path to append resource ids to".to_string(),
            });
        }

        let mut token_value = HeaderValue::from_str(token)?;
        token_value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(TOKEN_HEADER), token_value);

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            collection,
        })
    }

    /// Collection URL with `id` appended as one percent-encoded path segment.
    fn resource_url(&self, id: &ResourceRef) -> Url {
        let mut url = self.collection.clone();
        // Checked in `new`: the collection URL can be a base.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&id.to_string());
        }
        url
    }
}

#[async_trait]
impl ResourceApi for HttpResourceApi {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<ResourceRecord>, ApiError> {
        let response = self
            .client
            .get(self.collection.clone())
            .query(&query.as_pairs())
            .send()
            .await?;

        let url = response.url().to_string();
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status, url));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode {
            url,
            message: e.to_string(),
        })
    }

    async fn delete(&self, id: &ResourceRef) -> Result<(), ApiError> {
        let response = self.client.delete(self.resource_url(id)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status, response.url().to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn test_resource_ref_display() {
        assert_eq!(ResourceRef::Integer(42).to_string(), "42");
        assert_eq!(ResourceRef::from("abc-1").to_string(), "abc-1");
    }

    #[test]
    fn test_record_deserializes_integer_and_string_ids() {
        let records: Vec<ResourceRecord> = serde_json::from_str(
            r#"[
                {"id": 1, "status": "success", "ref": "main", "updated_at": "2022-01-01T00:00:00Z", "sha": "abc"},
                {"id": "run-2"}
            ]"#,
        )
        .unwrap();

        assert_eq!(records[0].id, ResourceRef::Integer(1));
        assert_eq!(records[0].status.as_deref(), Some("success"));
        assert_eq!(records[0].git_ref.as_deref(), Some("main"));
        assert_eq!(records[1].id, ResourceRef::String("run-2".into()));
        assert!(records[1].updated_at.is_none());
    }

    #[test]
    fn test_record_without_id_is_rejected() {
        let result: Result<Vec<ResourceRecord>, _> = serde_json::from_str(r#"[{"status": "failed"}]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_list_query_pairs() {
        let cutoff = RetentionCutoff::new(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        let pairs = ListQuery::new(2, cutoff).as_pairs();
        assert_eq!(
            pairs,
            [
                ("per_page", "2".to_string()),
                ("scope", "finished".to_string()),
                ("sort", "asc".to_string()),
                ("updated_before", "2023-01-01T00:00:00Z".to_string()),
            ]
        );
    }

    #[test]
    fn test_http_api_trims_trailing_slash() {
        let api = HttpResourceApi::new("https://api.example/pipelines/", "secret").unwrap();
        assert_eq!(api.base_url(), "https://api.example/pipelines");
        assert_eq!(
            api.resource_url(&ResourceRef::Integer(7)).as_str(),
            "https://api.example/pipelines/7"
        );
    }

    #[test]
    fn test_resource_url_encodes_string_ids() {
        let api = HttpResourceApi::new("https://api.example/projects/a%2Fb/pipelines", "secret")
            .unwrap();
        assert_eq!(
            api.resource_url(&ResourceRef::from("x/y?z#w")).as_str(),
            "https://api.example/projects/a%2Fb/pipelines/x%2Fy%3Fz%23w"
        );
    }

    #[cfg(feature = "native-http")]
    #[test]
    fn test_https_only_client_builds_with_default_features() {
        let client = Client::builder().use_rustls_tls().https_only(true).build();
        assert!(client.is_ok());
    }

    #[test]
    fn test_http_api_rejects_unusable_base_url() {
        for base in ["not a url", "mailto:ops@example.com"] {
            let err = HttpResourceApi::new(base, "secret").unwrap_err();
            assert!(matches!(err, ApiError::InvalidUrl { .. }), "{base}");
        }
    }

    #[test]
    fn test_http_api_rejects_token_with_newline() {
        let err = HttpResourceApi::new("https://api.example/pipelines", "bad\ntoken").unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken(_)));
    }
}
