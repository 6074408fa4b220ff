//! OAuth 2.0 token endpoint wire types.

use std::time::Duration;

use busbar_sf_client::Credential;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};
use crate::strategy::AuthStrategy;

/// Path of the token endpoint below a login URL.
pub const TOKEN_PATH: &str = "/services/oauth2/token";

/// Token endpoint for a login URL such as `https://login.salesforce.com`.
pub fn token_url(login_url: &str) -> String {
    format!("{}{}", login_url.trim_end_matches('/'), TOKEN_PATH)
}

/// Token response from OAuth.
///
/// Sensitive fields like `access_token` and `refresh_token` are redacted
/// in Debug output to prevent accidental exposure in logs.
#[derive(Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Refresh token (if issued or rotated).
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Instance URL.
    pub instance_url: String,
    /// User ID URL.
    #[serde(default)]
    pub id: Option<String>,
    /// Token type (usually "Bearer").
    #[serde(default)]
    pub token_type: Option<String>,
    /// Scopes granted.
    #[serde(default)]
    pub scope: Option<String>,
    /// Signature for verification.
    #[serde(default)]
    pub signature: Option<String>,
    /// Issued at, milliseconds since the epoch as a string.
    #[serde(default)]
    pub issued_at: Option<String>,
    /// Lifetime in seconds, when the endpoint reports one.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("instance_url", &self.instance_url)
            .field("id", &self.id)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("signature", &self.signature.as_ref().map(|_| "[REDACTED]"))
            .field("issued_at", &self.issued_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl TokenResponse {
    /// Build the credential this response describes.
    ///
    /// `fallback_refresh_token` is kept when the endpoint does not rotate it.
    pub fn into_credential(self, fallback_refresh_token: Option<&str>) -> Result<Credential> {
        if self.access_token.is_empty() {
            return Err(Error::new(ErrorKind::InvalidResponse(
                "missing access_token".to_string(),
            )));
        }
        url::Url::parse(&self.instance_url).map_err(|e| {
            Error::with_source(
                ErrorKind::InvalidResponse(format!("instance_url is not a URL: {e}")),
                e,
            )
        })?;

        let issued_at = self
            .issued_at
            .as_deref()
            .and_then(parse_issued_at)
            .unwrap_or_else(Utc::now);

        let mut credential =
            Credential::new(self.access_token, self.instance_url).with_issued_at(issued_at);
        if let Some(seconds) = self.expires_in {
            // Measured from receipt, not issue, so clock skew cannot shorten it
            let expires_at = chrono::Duration::from_std(Duration::from_secs(seconds))
                .ok()
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
            if let Some(expires_at) = expires_at {
                credential = credential.with_expires_at(expires_at);
            }
        }
        if let Some(refresh) = self.refresh_token.as_deref().or(fallback_refresh_token) {
            credential = credential.with_refresh_token(refresh);
        }
        if let Some(token_type) = self.token_type {
            credential = credential.with_token_type(token_type);
        }
        if let Some(id) = self.id {
            credential = credential.with_id(id);
        }
        if let Some(scope) = self.scope {
            credential = credential.with_scope(scope);
        }
        Ok(credential)
    }
}

/// Parse the platform's `issued_at`: epoch milliseconds, or RFC 3339.
fn parse_issued_at(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(millis) = value.parse::<i64>() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// OAuth error response.
#[derive(Debug, Deserialize)]
pub(crate) struct OAuthErrorResponse {
    pub(crate) error: String,
    #[serde(default)]
    pub(crate) error_description: String,
}

/// Turn a non-2xx token endpoint response into the reported OAuth error.
pub(crate) fn oauth_error(status: u16, body: &[u8]) -> Error {
    match serde_json::from_slice::<OAuthErrorResponse>(body) {
        Ok(response) => Error::new(ErrorKind::OAuth {
            status,
            error: response.error,
            description: response.error_description,
        }),
        Err(_) => Error::new(ErrorKind::OAuth {
            status,
            error: format!("http_{status}"),
            description: String::from_utf8_lossy(body).chars().take(200).collect(),
        }),
    }
}

/// Form fields for the strategy's exchange.
///
/// `refresh_token` overrides the configured one after the endpoint rotated it.
/// Returns `None` for strategies that never call the token endpoint.
pub(crate) fn grant_form(
    strategy: &AuthStrategy,
    refresh_token: Option<&str>,
) -> Option<Vec<(String, String)>> {
    let mut form: Vec<(String, String)> = Vec::new();
    let mut push = |key: &str, value: &str| form.push((key.to_string(), value.to_string()));

    match strategy {
        AuthStrategy::RefreshToken {
            client_id,
            client_secret,
            refresh_token: configured,
        } => {
            push("grant_type", "refresh_token");
            push("client_id", client_id);
            if let Some(secret) = client_secret {
                push("client_secret", secret);
            }
            push("refresh_token", refresh_token.unwrap_or(configured));
        }
        AuthStrategy::Password {
            client_id,
            client_secret,
            username,
            password,
            security_token,
        } => {
            push("grant_type", "password");
            push("client_id", client_id);
            if let Some(secret) = client_secret {
                push("client_secret", secret);
            }
            push("username", username);
            let password = match security_token {
                Some(token) => format!("{password}{token}"),
                None => password.clone(),
            };
            push("password", &password);
        }
        AuthStrategy::PreIssued { .. } => return None,
    }
    Some(form)
}
