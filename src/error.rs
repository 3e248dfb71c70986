use reqwest::StatusCode;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ClientError {
    /// The request never produced a response (DNS, connect, reset, timeout).
    #[error("Network error. Please check your connection. ({0})")]
    Network(String),

    #[error("{message}")]
    RequestFailed { status: StatusCode, message: String },

    #[error("Session expired. Please login again.")]
    SessionExpired,

    #[error("Invalid token payload received from server")]
    InvalidTokenPayload,

    #[error("Refresh token unavailable")]
    RefreshUnavailable,

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] SqlxError),

    #[error("Ractor error: {0}")]
    Actor(String),

    #[error("HTTP client setup error: {0}")]
    Setup(String),
}

impl ClientError {
    /// HTTP status carried by this error, if the server was reached.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::RequestFailed { status, .. } => Some(*status),
            ClientError::SessionExpired => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    /// Errors after which the caller no longer holds a usable session.
    pub fn ends_session(&self) -> bool {
        matches!(self, ClientError::SessionExpired)
    }

    pub(crate) fn request_failed(status: StatusCode, body: String) -> Self {
        let message = if body.trim().is_empty() {
            format!("Request failed with status {}", status.as_u16())
        } else {
            body
        };
        ClientError::RequestFailed { status, message }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Network(e.to_string())
    }
}

/// Outcome of a failed refresh, shared by every caller awaiting the same attempt.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum RefreshFailure {
    #[error("no refresh token stored")]
    Unavailable,

    #[error("refresh rejected with status {0}")]
    Rejected(StatusCode),

    #[error("refresh response missing access or refresh token")]
    InvalidPayload,

    #[error("refresh request failed: {0}")]
    Network(String),
}

impl From<RefreshFailure> for ClientError {
    fn from(f: RefreshFailure) -> Self {
        match f {
            RefreshFailure::Unavailable => ClientError::RefreshUnavailable,
            RefreshFailure::Rejected(_) => ClientError::SessionExpired,
            RefreshFailure::InvalidPayload => ClientError::InvalidTokenPayload,
            RefreshFailure::Network(msg) => ClientError::Network(msg),
        }
    }
}
