//! Error types for sf-client.
//!
//! Every server-reported failure keeps the platform's machine-readable
//! `errorCode` and field names; opaque bodies keep the raw bytes. Display
//! output is sanitized, the carried data is not.

use std::sync::LazyLock;
use std::time::Duration;

use bytes::Bytes;

/// Result type alias for sf-client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for sf-client operations.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional source error.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
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
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if this error kind is normally worth retrying.
    ///
    /// The executor decides from the classifier's [`Outcome`](crate::Outcome);
    /// this predicate is for callers layering their own recovery.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns true if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.kind, ErrorKind::RateLimited { .. })
    }

    /// Returns true if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Authentication { .. })
    }

    /// Returns true if the platform reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound { .. })
    }

    /// Returns true if the caller's own cancellation or deadline fired.
    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled | ErrorKind::DeadlineExceeded)
    }

    /// Returns true if the credential source has no way to renew the session.
    pub fn is_refresh_unsupported(&self) -> bool {
        matches!(
            &self.kind,
            ErrorKind::Authentication { code, .. } if code == codes::REFRESH_NOT_SUPPORTED
        )
    }

    /// Returns the retry-after duration if this is a rate limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match &self.kind {
            ErrorKind::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Server-reported error details, if any.
    pub fn details(&self) -> &[ApiErrorDetail] {
        match &self.kind {
            ErrorKind::Authorization { errors }
            | ErrorKind::NotFound { errors }
            | ErrorKind::Validation { errors, .. }
            | ErrorKind::MalformedRequest { errors, .. }
            | ErrorKind::RateLimited { errors, .. }
            | ErrorKind::RowLock { errors } => errors,
            _ => &[],
        }
    }

    /// For a `RetriesExhausted` error, the classified error of the final attempt.
    pub fn last_attempt_error(&self) -> Option<&Error> {
        match self.kind {
            ErrorKind::RetriesExhausted { .. } => self
                .source
                .as_deref()
                .and_then(|source| source.downcast_ref::<Error>()),
            _ => None,
        }
    }
}

/// One entry of the platform's error wire format.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApiErrorDetail {
    /// Machine-readable code, e.g. `REQUIRED_FIELD_MISSING`.
    pub error_code: String,
    /// Human-readable message.
    pub message: String,
    /// Offending field names.
    pub fields: Vec<String>,
}

impl ApiErrorDetail {
    /// Create a detail without field scope.
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Attach field names.
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }
}

impl std::fmt::Display for ApiErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.error_code,
            sanitize_error_message(&self.message)
        )?;
        if !self.fields.is_empty() {
            write!(f, " (fields: {})", self.fields.join(", "))?;
        }
        Ok(())
    }
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Credential rejected, or a credential exchange/refresh failed.
    #[error("Authentication error: {code} - {}", sanitize_error_message(message))]
    Authentication { code: String, message: String },

    /// Caller lacks permission (HTTP 403).
    #[error("Authorization error: {}", summarize(errors))]
    Authorization { errors: Vec<ApiErrorDetail> },

    /// Resource not found (HTTP 404).
    #[error("Not found: {}", summarize(errors))]
    NotFound { errors: Vec<ApiErrorDetail> },

    /// Request content or field values rejected by the server.
    #[error("Validation failed ({status}): {}", summarize(errors))]
    Validation {
        status: u16,
        errors: Vec<ApiErrorDetail>,
    },

    /// Request could not be parsed by the server.
    #[error("Malformed request ({status}): {}", summarize(errors))]
    MalformedRequest {
        status: u16,
        errors: Vec<ApiErrorDetail>,
    },

    /// The server asked the caller to slow down.
    #[error("Rate limited{}", retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimited {
        retry_after: Option<Duration>,
        errors: Vec<ApiErrorDetail>,
    },

    /// Row-lock contention on the platform side.
    #[error("Row lock contention: {}", summarize(errors))]
    RowLock { errors: Vec<ApiErrorDetail> },

    /// Transient server failure (HTTP 5xx).
    #[error("Server error: {status} {}", sanitize_error_message(message))]
    ServerError { status: u16, message: String },

    /// Non-success response whose body could not be interpreted.
    #[error("Unrecognized response: HTTP {status}: {}", sanitize_error_message(&String::from_utf8_lossy(body)))]
    Unrecognized { status: u16, body: Bytes },

    /// Request timeout.
    #[error("Request timeout")]
    Timeout,

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Any other transport failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller's deadline elapsed.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// All retries exhausted; the last attempt's error is the source.
    #[error("All {attempts} attempts exhausted")]
    RetriesExhausted { attempts: u32 },

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ErrorKind {
    /// Returns true if this error kind is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited { .. }
                | ErrorKind::RowLock { .. }
                | ErrorKind::ServerError { .. }
                | ErrorKind::Timeout
                | ErrorKind::Connection(_)
        )
    }
}

fn summarize(errors: &[ApiErrorDetail]) -> String {
    if errors.is_empty() {
        return "no details".to_string();
    }
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Well-known platform error codes.
pub mod codes {
    pub const INVALID_SESSION_ID: &str = "INVALID_SESSION_ID";
    pub const SESSION_EXPIRED: &str = "SESSION_EXPIRED";
    pub const INVALID_FIELD: &str = "INVALID_FIELD";
    pub const MALFORMED_QUERY: &str = "MALFORMED_QUERY";
    pub const MALFORMED_ID: &str = "MALFORMED_ID";
    pub const JSON_PARSER_ERROR: &str = "JSON_PARSER_ERROR";
    pub const INVALID_TYPE: &str = "INVALID_TYPE";
    pub const ENTITY_IS_DELETED: &str = "ENTITY_IS_DELETED";
    pub const DUPLICATE_VALUE: &str = "DUPLICATE_VALUE";
    pub const REQUIRED_FIELD_MISSING: &str = "REQUIRED_FIELD_MISSING";
    pub const FIELD_CUSTOM_VALIDATION_EXCEPTION: &str = "FIELD_CUSTOM_VALIDATION_EXCEPTION";
    pub const INVALID_CROSS_REFERENCE_KEY: &str = "INVALID_CROSS_REFERENCE_KEY";
    pub const INSUFFICIENT_ACCESS_ON_CROSS_REFERENCE_ENTITY: &str =
        "INSUFFICIENT_ACCESS_ON_CROSS_REFERENCE_ENTITY";
    pub const REQUEST_LIMIT_EXCEEDED: &str = "REQUEST_LIMIT_EXCEEDED";
    pub const STORAGE_LIMIT_EXCEEDED: &str = "STORAGE_LIMIT_EXCEEDED";
    pub const UNABLE_TO_LOCK_ROW: &str = "UNABLE_TO_LOCK_ROW";
    pub const NOT_FOUND: &str = "NOT_FOUND";

    // Reported by this library rather than the platform
    pub const REFRESH_NOT_SUPPORTED: &str = "REFRESH_NOT_SUPPORTED";
    pub const AUTHENTICATION_FAILED: &str = "AUTHENTICATION_FAILED";
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() {
            ErrorKind::Connection(sanitize_error_message(&err.to_string()))
        } else {
            ErrorKind::Transport(sanitize_error_message(&err.to_string()))
        };

        Error::with_source(kind, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Json(err.to_string()), err)
    }
}

impl From<serde_urlencoded::ser::Error> for Error {
    fn from(err: serde_urlencoded::ser::Error) -> Self {
        Error::with_source(ErrorKind::Serialization(err.to_string()), err)
    }
}

/// Sanitize an error message to prevent exposing sensitive data.
///
/// This function:
/// - Truncates messages longer than 500 characters
/// - Removes potential tokens (anything that looks like an access token)
/// - Removes potential session IDs and bearer tokens
pub fn sanitize_error_message(message: &str) -> String {
    const MAX_LENGTH: usize = 500;

    // Salesforce tokens start with the 15/18 char org id, then "!"
    static TOKEN_PATTERN: LazyLock<Option<regex_lite::Regex>> = LazyLock::new(|| {
        regex_lite::Regex::new(r"00[A-Za-z0-9]{13,}[!][A-Za-z0-9_.]+").ok()
    });
    static SESSION_PATTERN: LazyLock<Option<regex_lite::Regex>> =
        LazyLock::new(|| regex_lite::Regex::new(r"sid=[A-Za-z0-9]{20,}").ok());
    static BEARER_PATTERN: LazyLock<Option<regex_lite::Regex>> =
        LazyLock::new(|| regex_lite::Regex::new(r"Bearer\s+[A-Za-z0-9!._\-]+").ok());

    let mut sanitized = message.to_string();
    if let Some(pattern) = TOKEN_PATTERN.as_ref() {
        sanitized = pattern
            .replace_all(&sanitized, "[REDACTED_TOKEN]")
            .to_string();
    }
    if let Some(pattern) = SESSION_PATTERN.as_ref() {
        sanitized = pattern.replace_all(&sanitized, "sid=[REDACTED]").to_string();
    }
    if let Some(pattern) = BEARER_PATTERN.as_ref() {
        sanitized = pattern
            .replace_all(&sanitized, "Bearer [REDACTED]")
            .to_string();
    }

    if sanitized.len() > MAX_LENGTH {
        let mut cut = MAX_LENGTH;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str("...[truncated]");
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        let err = Error::new(ErrorKind::RateLimited {
            retry_after: None,
            errors: vec![],
        });
        assert!(err.is_retryable());

        let err = Error::new(ErrorKind::Timeout);
        assert!(err.is_retryable());

        let err = Error::new(ErrorKind::ServerError {
            status: 503,
            message: "Service unavailable".to_string(),
        });
        assert!(err.is_retryable());

        let err = Error::new(ErrorKind::RowLock { errors: vec![] });
        assert!(err.is_retryable());

        let err = Error::new(ErrorKind::NotFound { errors: vec![] });
        assert!(!err.is_retryable());

        let err = Error::new(ErrorKind::Authentication {
            code: "INVALID_SESSION_ID".into(),
            message: "expired".into(),
        });
        assert!(!err.is_retryable());

        assert!(!Error::new(ErrorKind::Cancelled).is_retryable());
    }

    #[test]
    fn test_cancellation_is_distinguishable() {
        assert!(Error::new(ErrorKind::Cancelled).is_cancellation());
        assert!(Error::new(ErrorKind::DeadlineExceeded).is_cancellation());
        assert!(!Error::new(ErrorKind::Timeout).is_cancellation());
    }

    #[test]
    fn test_rate_limit_retry_after() {
        let err = Error::new(ErrorKind::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
            errors: vec![],
        });
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert!(err.to_string().contains("retry after"));

        let err = Error::new(ErrorKind::Timeout);
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_validation_display_keeps_codes_and_fields() {
        let err = Error::new(ErrorKind::Validation {
            status: 400,
            errors: vec![
                ApiErrorDetail::new("REQUIRED_FIELD_MISSING", "Required fields are missing")
                    .with_fields(vec!["Name".into(), "Email".into()]),
                ApiErrorDetail::new("FIELD_CUSTOM_VALIDATION_EXCEPTION", "Must be positive"),
            ],
        });

        let display = err.to_string();
        assert!(display.contains("REQUIRED_FIELD_MISSING"));
        assert!(display.contains("fields: Name, Email"));
        assert!(display.contains("FIELD_CUSTOM_VALIDATION_EXCEPTION"));
        assert_eq!(err.details().len(), 2);
    }

    #[test]
    fn test_last_attempt_error() {
        let last = Error::new(ErrorKind::ServerError {
            status: 503,
            message: "unavailable".into(),
        });
        let err = Error::with_source(ErrorKind::RetriesExhausted { attempts: 3 }, last);

        let inner = err.last_attempt_error().expect("wrapped error");
        assert!(matches!(inner.kind, ErrorKind::ServerError { status: 503, .. }));
        assert!(err.to_string().contains("All 3 attempts exhausted"));

        assert!(Error::new(ErrorKind::Timeout).last_attempt_error().is_none());
    }

    #[test]
    fn test_unrecognized_keeps_raw_body() {
        let raw = Bytes::from_static(b"<html>gateway</html>");
        let err = Error::new(ErrorKind::Unrecognized {
            status: 418,
            body: raw.clone(),
        });
        match &err.kind {
            ErrorKind::Unrecognized { status, body } => {
                assert_eq!(*status, 418);
                assert_eq!(body, &raw);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
        assert!(err.to_string().contains("418"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("not valid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err.kind, ErrorKind::Json(_)));
        assert!(err.source.is_some());
    }

    #[test]
    fn test_sanitize_redacts_access_tokens() {
        let msg = "Session expired: 00Dxx0000001gEF!AQcAQH3k9s7LKbp_example_token_value.here";
        let sanitized = sanitize_error_message(msg);
        assert!(sanitized.contains("[REDACTED_TOKEN]"));
        assert!(!sanitized.contains("AQcAQH3k9s7LKbp"));
    }

    #[test]
    fn test_sanitize_redacts_session_ids() {
        let sanitized = sanitize_error_message("Invalid session: sid=abc123def456ghi789jkl012");
        assert!(sanitized.contains("sid=[REDACTED]"));
        assert!(!sanitized.contains("abc123def456"));
    }

    #[test]
    fn test_sanitize_redacts_bearer_tokens() {
        let sanitized = sanitize_error_message("rejected header: Bearer abc.DEF-123_x");
        assert_eq!(sanitized, "rejected header: Bearer [REDACTED]");
    }

    #[test]
    fn test_sanitize_keeps_token_endpoint_urls() {
        let msg = "error sending request for url (https://login.salesforce.com/services/oauth2/token)";
        assert_eq!(sanitize_error_message(msg), msg);
    }

    #[test]
    fn test_refresh_unsupported_is_recognized() {
        let err = Error::new(ErrorKind::Authentication {
            code: codes::REFRESH_NOT_SUPPORTED.to_string(),
            message: "pre-issued token".to_string(),
        });
        assert!(err.is_refresh_unsupported());
        assert!(err.is_auth_error());

        let err = Error::new(ErrorKind::Authentication {
            code: codes::INVALID_SESSION_ID.to_string(),
            message: "Session expired or invalid".to_string(),
        });
        assert!(!err.is_refresh_unsupported());
    }

    #[test]
    fn test_sanitize_truncates_long_messages() {
        let sanitized = sanitize_error_message(&"x".repeat(600));
        assert!(sanitized.len() < 600);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_sanitize_passes_through_clean_messages() {
        let msg = "No such column 'foo' on entity 'Account'";
        assert_eq!(sanitize_error_message(msg), msg);
    }
}
