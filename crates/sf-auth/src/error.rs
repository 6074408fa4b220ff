//! Error types for sf-auth.
//!
//! Error messages are designed to avoid exposing sensitive credential data.
//! Errors are cheaply cloneable so that every caller waiting on a shared
//! refresh observes the same failure.

use std::sync::Arc;

/// Result type alias for sf-auth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for sf-auth operations.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional source error.
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Create a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Create a new error with the given kind and source.
    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Arc::new(source)),
        }
    }

    /// Returns true if the caller's own cancellation or deadline fired.
    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled | ErrorKind::DeadlineExceeded)
    }

    /// The OAuth error code reported by the token endpoint, e.g. `invalid_grant`.
    pub fn oauth_error(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::OAuth { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// The kind of error that occurred.
///
/// Error messages avoid including credential values.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ErrorKind {
    /// OAuth error response from the token endpoint.
    #[error("OAuth error ({status}): {error} - {description}")]
    OAuth {
        status: u16,
        error: String,
        description: String,
    },

    /// The active strategy has no renewal path.
    #[error("Token refresh not supported for pre-issued access tokens")]
    RefreshNotSupported,

    /// Invalid credentials configuration.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The token exchange did not produce a response.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The token endpoint answered with something other than a token.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Environment variable not set.
    #[error("Environment variable not set: {0}")]
    EnvVar(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller cancelled the exchange.
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller's deadline elapsed during the exchange.
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Json(err.to_string()), err)
    }
}

impl From<busbar_sf_client::Error> for Error {
    fn from(err: busbar_sf_client::Error) -> Self {
        use busbar_sf_client::ErrorKind as ClientKind;

        let kind = match &err.kind {
            ClientKind::Cancelled => ErrorKind::Cancelled,
            ClientKind::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            ClientKind::Json(message) => ErrorKind::Json(message.clone()),
            ClientKind::Serialization(message) | ClientKind::Config(message) => {
                ErrorKind::Config(message.clone())
            }
            _ => ErrorKind::Http(busbar_sf_client::sanitize_error_message(&err.to_string())),
        };
        Error::with_source(kind, err)
    }
}

/// Authentication failures as seen by the request pipeline.
impl From<Error> for busbar_sf_client::Error {
    fn from(err: Error) -> Self {
        use busbar_sf_client::{codes, ErrorKind as ClientKind};

        let kind = match &err.kind {
            ErrorKind::Cancelled => ClientKind::Cancelled,
            ErrorKind::DeadlineExceeded => ClientKind::DeadlineExceeded,
            ErrorKind::OAuth {
                error, description, ..
            } => ClientKind::Authentication {
                code: error.clone(),
                message: description.clone(),
            },
            ErrorKind::RefreshNotSupported => ClientKind::Authentication {
                code: codes::REFRESH_NOT_SUPPORTED.to_string(),
                message: err.kind.to_string(),
            },
            other => ClientKind::Authentication {
                code: codes::AUTHENTICATION_FAILED.to_string(),
                message: other.to_string(),
            },
        };
        busbar_sf_client::Error::with_source(kind, err)
    }
}
