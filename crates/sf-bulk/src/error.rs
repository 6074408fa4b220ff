//! Error types for sf-bulk.

use crate::types::JobState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    pub kind: ErrorKind,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn invalid_state(job_id: &str, state: JobState, operation: &'static str) -> Self {
        Self::new(ErrorKind::InvalidState {
            job_id: job_id.to_string(),
            state,
            operation,
        })
    }

    /// The request pipeline error behind a `Client` kind.
    pub fn client_error(&self) -> Option<&busbar_sf_client::Error> {
        match self.kind {
            ErrorKind::Client(_) => self
                .source
                .as_deref()
                .and_then(|source| source.downcast_ref::<busbar_sf_client::Error>()),
            _ => None,
        }
    }

    /// Returns true if the caller's own cancellation or deadline fired.
    pub fn is_cancellation(&self) -> bool {
        self.client_error()
            .is_some_and(busbar_sf_client::Error::is_cancellation)
    }

    /// Returns true if the job was not in a state that allows the operation.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidState { .. })
    }

    pub fn is_not_found(&self) -> bool {
        self.client_error()
            .is_some_and(busbar_sf_client::Error::is_not_found)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("Client error: {0}")]
    Client(String),

    /// The job's current state does not accept the requested operation.
    #[error("Job {job_id} is {state}; cannot {operation}")]
    InvalidState {
        job_id: String,
        state: JobState,
        operation: &'static str,
    },

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Invalid job request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Other(String),
}

impl From<busbar_sf_client::Error> for Error {
    fn from(err: busbar_sf_client::Error) -> Self {
        Error {
            kind: ErrorKind::Client(err.to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error {
            kind: ErrorKind::Csv(err.to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Json(err.to_string()),
            source: Some(Box::new(err)),
        }
    }
}
