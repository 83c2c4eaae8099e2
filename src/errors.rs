/// errors.rs – Failure taxonomy for everything fetched from the backend.
///
/// Transport failures, non-success statuses and undecodable payloads are
/// kept apart so widgets can show a precise inline message. The type is
/// `Clone` because one failed request may be observed by several consumers
/// sharing the same in-flight fetch.
use thiserror::Error;

pub const FALLBACK_MESSAGE: &str = "An unexpected error occurred";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Payload(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Payload(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Payload(e.to_string())
    }
}

/// Human-readable message for an optional error, falling back to `fallback`
/// when there is no error or it renders as an empty string.
pub fn error_message(err: Option<&dyn std::error::Error>, fallback: &str) -> String {
    match err.map(|e| e.to_string()) {
        Some(msg) if !msg.trim().is_empty() => msg,
        _ => fallback.to_string(),
    }
}
