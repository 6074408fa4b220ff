//! The three credential exchange strategies.

use crate::error::{Error, ErrorKind, Result};

/// How a provider obtains and renews credentials.
///
/// Exactly one strategy is active per provider; each variant carries only the
/// fields its flow needs. Secrets are redacted in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    /// OAuth 2.0 refresh-token grant. Authenticating and refreshing both
    /// exchange the refresh token.
    RefreshToken {
        client_id: String,
        client_secret: Option<String>,
        refresh_token: String,
    },
    /// OAuth 2.0 resource-owner password grant. Refreshing re-authenticates
    /// from scratch.
    Password {
        client_id: String,
        client_secret: Option<String>,
        username: String,
        password: String,
        security_token: Option<String>,
    },
    /// An access token issued out-of-band. It cannot be renewed.
    PreIssued {
        access_token: String,
        instance_url: String,
    },
}

impl std::fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthStrategy::RefreshToken {
                client_id,
                client_secret,
                ..
            } => f
                .debug_struct("RefreshToken")
                .field("client_id", client_id)
                .field("client_secret", &client_secret.as_ref().map(|_| "[REDACTED]"))
                .field("refresh_token", &"[REDACTED]")
                .finish(),
            AuthStrategy::Password {
                client_id,
                client_secret,
                username,
                security_token,
                ..
            } => f
                .debug_struct("Password")
                .field("client_id", client_id)
                .field("client_secret", &client_secret.as_ref().map(|_| "[REDACTED]"))
                .field("username", username)
                .field("password", &"[REDACTED]")
                .field(
                    "security_token",
                    &security_token.as_ref().map(|_| "[REDACTED]"),
                )
                .finish(),
            AuthStrategy::PreIssued { instance_url, .. } => f
                .debug_struct("PreIssued")
                .field("access_token", &"[REDACTED]")
                .field("instance_url", instance_url)
                .finish(),
        }
    }
}

impl AuthStrategy {
    pub fn refresh_token(
        client_id: impl Into<String>,
        client_secret: Option<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        AuthStrategy::RefreshToken {
            client_id: client_id.into(),
            client_secret,
            refresh_token: refresh_token.into(),
        }
    }

    pub fn password(
        client_id: impl Into<String>,
        client_secret: Option<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        security_token: Option<String>,
    ) -> Self {
        AuthStrategy::Password {
            client_id: client_id.into(),
            client_secret,
            username: username.into(),
            password: password.into(),
            security_token,
        }
    }

    pub fn pre_issued(access_token: impl Into<String>, instance_url: impl Into<String>) -> Self {
        AuthStrategy::PreIssued {
            access_token: access_token.into(),
            instance_url: instance_url.into(),
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            AuthStrategy::RefreshToken { .. } => "refresh_token",
            AuthStrategy::Password { .. } => "password",
            AuthStrategy::PreIssued { .. } => "pre_issued",
        }
    }

    /// Whether the strategy talks to the token endpoint.
    pub fn uses_token_endpoint(&self) -> bool {
        !matches!(self, AuthStrategy::PreIssued { .. })
    }

    /// Whether the strategy can produce a new credential after rejection.
    pub fn supports_refresh(&self) -> bool {
        self.uses_token_endpoint()
    }

    /// Check required fields are present.
    pub fn validate(&self) -> Result<()> {
        let require = |value: &str, name: &str| {
            if value.trim().is_empty() {
                Err(Error::new(ErrorKind::InvalidCredentials(format!(
                    "{name} is required"
                ))))
            } else {
                Ok(())
            }
        };

        match self {
            AuthStrategy::RefreshToken {
                client_id,
                refresh_token,
                ..
            } => {
                require(client_id, "client_id")?;
                require(refresh_token, "refresh_token")
            }
            AuthStrategy::Password {
                client_id,
                username,
                password,
                ..
            } => {
                require(client_id, "client_id")?;
                require(username, "username")?;
                require(password, "password")
            }
            AuthStrategy::PreIssued {
                access_token,
                instance_url,
            } => {
                require(access_token, "access_token")?;
                require(instance_url, "instance_url")?;
                url::Url::parse(instance_url).map_err(|e| {
                    Error::with_source(
                        ErrorKind::InvalidCredentials(format!("instance_url is not a URL: {e}")),
                        e,
                    )
                })?;
                Ok(())
            }
        }
    }

    /// Select a strategy from `SF_*` (or `SALESFORCE_*`) environment variables.
    ///
    /// A refresh token wins over a username, which wins over a pre-issued
    /// access token:
    /// - `SF_CLIENT_ID`, `SF_CLIENT_SECRET`, `SF_REFRESH_TOKEN`
    /// - `SF_CLIENT_ID`, `SF_CLIENT_SECRET`, `SF_USERNAME`, `SF_PASSWORD`, `SF_SECURITY_TOKEN`
    /// - `SF_ACCESS_TOKEN`, `SF_INSTANCE_URL`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |suffix: &str| {
            lookup(&format!("SF_{suffix}"))
                .or_else(|| lookup(&format!("SALESFORCE_{suffix}")))
                .filter(|value| !value.is_empty())
        };

        if let Some(refresh_token) = var("REFRESH_TOKEN") {
            let client_id = var("CLIENT_ID")
                .ok_or_else(|| Error::new(ErrorKind::EnvVar("SF_CLIENT_ID".to_string())))?;
            return Ok(Self::refresh_token(
                client_id,
                var("CLIENT_SECRET"),
                refresh_token,
            ));
        }

        if let Some(username) = var("USERNAME") {
            let client_id = var("CLIENT_ID")
                .ok_or_else(|| Error::new(ErrorKind::EnvVar("SF_CLIENT_ID".to_string())))?;
            let password = var("PASSWORD")
                .ok_or_else(|| Error::new(ErrorKind::EnvVar("SF_PASSWORD".to_string())))?;
            return Ok(Self::password(
                client_id,
                var("CLIENT_SECRET"),
                username,
                password,
                var("SECURITY_TOKEN"),
            ));
        }

        if let Some(access_token) = var("ACCESS_TOKEN") {
            let instance_url = var("INSTANCE_URL")
                .ok_or_else(|| Error::new(ErrorKind::EnvVar("SF_INSTANCE_URL".to_string())))?;
            return Ok(Self::pre_issued(access_token, instance_url));
        }

        Err(Error::new(ErrorKind::EnvVar(
            "one of SF_REFRESH_TOKEN, SF_USERNAME or SF_ACCESS_TOKEN".to_string(),
        )))
    }
}
