//! Error types for the retention sweeper.
//!
//! Two layers are kept apart:
//! - [`ApiError`] describes what went wrong with a single call against the
//!   resource API.
//! - [`SweepError`] is the terminal classification of a whole sweep.
//!
//! The sweeper decides per call type which `ApiError`s become fatal; only the
//! rate-limit signal is fatal for deletions.

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single listing or deletion call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The API answered `429 Too Many Requests`.
    #[error("Rate limit reached for {url}")]
    RateLimited { url: String },

    /// Any other non-success status.
    #[error("Request failed with status {status} ({reason}) for {url}")]
    Status {
        status: StatusCode,
        reason: String,
        url: String,
    },

    /// Connection, timeout or body transfer failure.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The listing body was not a JSON array of records.
    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The token cannot be sent as a header value.
    #[error("Token is not a valid header value: {0}")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),

    /// The collection URL cannot carry resource ids as path segments.
    #[error("Invalid base URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl ApiError {
    /// Classify a non-success status. `429` is the only status treated specially.
    pub fn from_status(status: StatusCode, url: impl Into<String>) -> Self {
        let url = url.into();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Self::RateLimited { url };
        }
        Self::Status {
            status,
            reason: status
                .canonical_reason()
                .unwrap_or("Unknown Status")
                .to_string(),
            url,
        }
    }

    /// Returns true for the rate-limit signal.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Human-readable reason, without the URL.
    pub fn reason(&self) -> String {
        match self {
            Self::RateLimited { .. } => "Too Many Requests".to_string(),
            Self::Status { reason, .. } => reason.clone(),
            Self::Transport(e) => e.to_string(),
            Self::Decode { message, .. } => message.clone(),
            Self::InvalidToken(e) => e.to_string(),
            Self::InvalidUrl { message, .. } => message.clone(),
        }
    }

    /// Target URL of the failed call, when known.
    pub fn url(&self) -> String {
        match self {
            Self::RateLimited { url }
            | Self::Status { url, .. }
            | Self::Decode { url, .. }
            | Self::InvalidUrl { url, .. } => url.clone(),
            Self::Transport(e) => e.url().map(|u| u.to_string()).unwrap_or_default(),
            Self::InvalidToken(_) => String::new(),
        }
    }
}

/// Terminal failure of a sweep. Every variant aborts the run.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Rejected before any network call: bad cutoff, page size or base URL.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A listing call failed for a reason other than rate limiting, or a page
    /// where nothing could be deleted failed again when it was listed again.
    #[error("Querying for resources failed because of \"{reason}\" for {url}")]
    RequestFailed { reason: String, url: String },

    /// A listing or deletion call was rate limited.
    #[error("Rate limits have been reached for {url}, wait and try again later")]
    RateLimited { url: String },
}

impl SweepError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl From<ApiError> for SweepError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::RateLimited { url } => Self::RateLimited { url },
            ApiError::InvalidToken(e) => Self::InvalidArgument(format!("invalid token: {e}")),
            ApiError::InvalidUrl { url, message } => {
                Self::InvalidArgument(format!("invalid base URL {url}: {message}"))
            }
            other => Self::RequestFailed {
                reason: other.reason(),
                url: other.url(),
            },
        }
    }
}
