//! Error type for the connection facade.

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

    /// Returns true if the caller's own cancellation or deadline fired.
    pub fn is_cancellation(&self) -> bool {
        let Some(source) = self.source.as_deref() else {
            return false;
        };
        if let Some(err) = source.downcast_ref::<busbar_sf_client::Error>() {
            return err.is_cancellation();
        }
        if let Some(err) = source.downcast_ref::<busbar_sf_auth::Error>() {
            return err.is_cancellation();
        }
        false
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Client error: {0}")]
    Client(String),
}

impl From<busbar_sf_auth::Error> for Error {
    fn from(err: busbar_sf_auth::Error) -> Self {
        Error {
            kind: ErrorKind::Auth(err.to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<busbar_sf_client::Error> for Error {
    fn from(err: busbar_sf_client::Error) -> Self {
        Error {
            kind: ErrorKind::Client(err.to_string()),
            source: Some(Box::new(err)),
        }
    }
}
