//! Error types for the client library.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to a Metabase instance.
///
/// Nothing in this enum is retried by the library except the single
/// 401 → re-authenticate → replay path; every variant carries enough context
/// to render a user-facing message without another network call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Bad credential combination or unusable base URL.
    ///
    /// Fatal at construction time. Never retried.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The login performed while constructing a session client failed.
    ///
    /// The client is not usable; construction is aborted.
    #[error("initial authentication failed: {0}")]
    InitialAuthError(#[source] Box<ClientError>),

    /// A login call was rejected by the server.
    #[error("session auth failed with status {}: {body}", .status.as_u16())]
    AuthError {
        /// HTTP status returned by the login endpoint.
        status: StatusCode,
        /// Raw response body.
        body: String,
    },

    /// Non-2xx response after any retry.
    #[error("metabase API error (status {}): {body}", .status.as_u16())]
    RemoteApiError {
        /// HTTP status returned by the API.
        status: StatusCode,
        /// Raw response body, surfaced verbatim for diagnosis.
        body: String,
    },

    /// The read-only guard rejected a query.
    #[error("query contains blocked operation: {keyword}. Only read-only (SELECT) queries are allowed")]
    BlockedOperationError {
        /// The first blocked keyword found, in canonical upper case.
        keyword: &'static str,
    },

    /// Transport-level failure: timeout, connection failure, unreadable body.
    #[error("request failed: {0}")]
    RequestFailedError(#[from] reqwest::Error),

    /// JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The caller's cancellation signal fired before the call completed.
    #[error("request cancelled")]
    Cancelled,

    /// Malformed request arguments, rejected before dispatch.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The startup check against the current-user endpoint failed.
    #[error("metabase health check failed: {0}")]
    HealthCheckError(#[source] Box<ClientError>),
}

impl ClientError {
    /// HTTP status associated with this error, if any.
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::AuthError { status, .. } | Self::RemoteApiError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this error stems from a rejected credential.
    pub fn is_authentication_error(&self) -> bool {
        match self {
            Self::AuthError { .. } | Self::InitialAuthError(_) => true,
            Self::RemoteApiError { status, .. } => *status == StatusCode::UNAUTHORIZED,
            _ => false,
        }
    }

    /// Check if this is a guard rejection.
    pub const fn is_blocked_operation(&self) -> bool {
        matches!(self, Self::BlockedOperationError { .. })
    }

    /// Check if this is a transport-level failure.
    pub const fn is_request_failure(&self) -> bool {
        matches!(self, Self::RequestFailedError(_))
    }
}
