//! Mapping from a raw response or transport failure to a retry-relevant outcome.
//!
//! Everything here is pure: no I/O, no state beyond the caller's opt-in list
//! of 5xx statuses that should not be retried.

use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;

use crate::error::{codes, ApiErrorDetail, Error, ErrorKind};

/// Classified result of a single attempt.
#[derive(Debug)]
pub enum Outcome {
    /// 2xx (or 304); the response body.
    Success(Bytes),
    /// Worth another attempt, after `suggested_delay` if the server gave one.
    Retryable {
        error: Error,
        suggested_delay: Option<Duration>,
    },
    /// The platform rejected the session.
    AuthExpired(Error),
    /// Stop and surface the error.
    Fatal(Error),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// The classified error, if the attempt failed.
    pub fn into_error(self) -> Option<Error> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Retryable { error, .. } | Outcome::AuthExpired(error) | Outcome::Fatal(error) => {
                Some(error)
            }
        }
    }
}

/// Error codes that mean the request itself could not be understood.
const MALFORMED_CODES: &[&str] = &[
    codes::MALFORMED_QUERY,
    codes::JSON_PARSER_ERROR,
    codes::INVALID_TYPE,
    codes::MALFORMED_ID,
];

/// Classifies responses and transport failures.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    fatal_server_statuses: Vec<u16>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 5xx statuses that should fail immediately instead of being retried.
    pub fn with_fatal_server_statuses(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self {
            fatal_server_statuses: statuses.into_iter().collect(),
        }
    }

    /// Classify a complete response.
    pub fn classify(&self, status: u16, headers: &[(String, String)], body: &Bytes) -> Outcome {
        if (200..300).contains(&status) || status == 304 {
            return Outcome::Success(body.clone());
        }

        let details = parse_error_body(body);
        let has_code = |code: &str| {
            details
                .as_deref()
                .is_some_and(|errors| errors.iter().any(|e| e.error_code == code))
        };

        let row_lock = has_code(codes::UNABLE_TO_LOCK_ROW);
        let limit_exceeded = has_code(codes::REQUEST_LIMIT_EXCEEDED);
        let malformed = status == 400 && MALFORMED_CODES.iter().any(|code| has_code(*code));

        if row_lock {
            return Outcome::Retryable {
                error: Error::new(ErrorKind::RowLock {
                    errors: details.unwrap_or_default(),
                }),
                suggested_delay: None,
            };
        }

        match status {
            401 => {
                let (code, message) = match details.as_deref().and_then(|d| d.first()) {
                    Some(first) => (first.error_code.clone(), first.message.clone()),
                    None => (
                        codes::INVALID_SESSION_ID.to_string(),
                        String::from_utf8_lossy(body).into_owned(),
                    ),
                };
                Outcome::AuthExpired(Error::new(ErrorKind::Authentication { code, message }))
            }
            403 if limit_exceeded => {
                self.rate_limited(headers, details.unwrap_or_default())
            }
            403 => Outcome::Fatal(Error::new(ErrorKind::Authorization {
                errors: details.unwrap_or_default(),
            })),
            404 => Outcome::Fatal(Error::new(ErrorKind::NotFound {
                errors: details.unwrap_or_default(),
            })),
            429 => self.rate_limited(headers, details.unwrap_or_default()),
            500..=599 => {
                let message = match &details {
                    Some(errors) => errors
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; "),
                    None => String::from_utf8_lossy(body).into_owned(),
                };
                let error = Error::new(ErrorKind::ServerError { status, message });
                if self.fatal_server_statuses.contains(&status) {
                    Outcome::Fatal(error)
                } else {
                    Outcome::Retryable {
                        error,
                        suggested_delay: retry_after(headers),
                    }
                }
            }
            _ => match details {
                Some(errors) if malformed => {
                    Outcome::Fatal(Error::new(ErrorKind::MalformedRequest { status, errors }))
                }
                Some(errors) if (400..500).contains(&status) => {
                    Outcome::Fatal(Error::new(ErrorKind::Validation { status, errors }))
                }
                _ => Outcome::Fatal(Error::new(ErrorKind::Unrecognized {
                    status,
                    body: body.clone(),
                })),
            },
        }
    }

    /// Classify a failure that produced no response.
    pub fn classify_transport(&self, error: Error) -> Outcome {
        match error.kind {
            ErrorKind::Timeout | ErrorKind::Connection(_) => Outcome::Retryable {
                error,
                suggested_delay: None,
            },
            _ => Outcome::Fatal(error),
        }
    }

    fn rate_limited(&self, headers: &[(String, String)], errors: Vec<ApiErrorDetail>) -> Outcome {
        let hint = retry_after(headers);
        Outcome::Retryable {
            error: Error::new(ErrorKind::RateLimited {
                retry_after: hint,
                errors,
            }),
            suggested_delay: hint,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "errorCode")]
    error_code: Option<String>,
    #[serde(default)]
    fields: Option<Vec<String>>,
    // OAuth endpoints report `{error, error_description}` instead
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl WireError {
    fn is_meaningful(&self) -> bool {
        self.error_code.as_deref().is_some_and(|c| !c.is_empty())
            || self.error.as_deref().is_some_and(|c| !c.is_empty())
    }

    fn into_detail(self) -> ApiErrorDetail {
        let code = self.error_code.or(self.error).unwrap_or_default();
        let message = self
            .message
            .or(self.error_description)
            .unwrap_or_default();
        ApiErrorDetail::new(code, message).with_fields(self.fields.unwrap_or_default())
    }
}

/// Parse the platform's error wire format: an array of
/// `{message, errorCode, fields?}` or a single such object.
///
/// Returns `None` when the body is not recognizable as either.
pub fn parse_error_body(body: &[u8]) -> Option<Vec<ApiErrorDetail>> {
    if let Ok(list) = serde_json::from_slice::<Vec<WireError>>(body) {
        if !list.is_empty() && list.iter().any(WireError::is_meaningful) {
            return Some(list.into_iter().map(WireError::into_detail).collect());
        }
    }

    match serde_json::from_slice::<WireError>(body) {
        Ok(single) if single.is_meaningful() => Some(vec![single.into_detail()]),
        _ => None,
    }
}

/// `Retry-After` as delta-seconds or an HTTP date.
fn retry_after(headers: &[(String, String)]) -> Option<Duration> {
    let value = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .map(|(_, value)| value.trim())?;

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}
