//! Authenticated session value and the seam through which the executor obtains it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::context::Context;
use crate::error::Result;

/// A credential with an expiry is treated as expired this long before it.
pub const EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// One authenticated session against one tenant.
///
/// The token and the base address always travel together. A credential is
/// never mutated after construction: a refresh produces a new value that
/// replaces the old one wholesale.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    base_address: String,
    issued_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    refresh_token: Option<String>,
    token_type: Option<String>,
    id: Option<String>,
    scope: Option<String>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("base_address", &self.base_address)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("id", &self.id)
            .field("scope", &self.scope)
            .finish()
    }
}

impl Credential {
    /// A credential issued now, with no known expiry.
    pub fn new(access_token: impl Into<String>, base_address: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            base_address: base_address.into().trim_end_matches('/').to_string(),
            issued_at: Utc::now(),
            expires_at: None,
            refresh_token: None,
            token_type: None,
            id: None,
            scope: None,
        }
    }

    pub fn with_issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = issued_at;
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the expiry relative to the issue time.
    pub fn with_lifetime(self, lifetime: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|lifetime| self.issued_at.checked_add_signed(lifetime));
        match expires_at {
            Some(expires_at) => self.with_expires_at(expires_at),
            None => self,
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    /// Identity URL of the authenticated user.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Base address (instance URL) for every call made with this credential.
    pub fn base_address(&self) -> &str {
        &self.base_address
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Whether the credential should be renewed before use.
    ///
    /// Without an expiry the credential stays valid until the platform
    /// rejects it.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        let margin = chrono::Duration::from_std(EXPIRY_SAFETY_MARGIN)
            .unwrap_or_else(|_| chrono::Duration::zero());
        now + margin >= expires_at
    }
}

/// Owner of the current credential.
///
/// The executor reads through this seam so the credential lifecycle can be
/// provided by any implementation; `busbar-sf-auth` ships the OAuth one.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Latest known credential, without blocking.
    fn current(&self) -> Option<Arc<Credential>>;

    /// Obtain a credential from scratch.
    async fn authenticate(&self, ctx: &Context) -> Result<Arc<Credential>>;

    /// Renew the credential. Concurrent callers share a single renewal.
    async fn refresh(&self, ctx: &Context) -> Result<Arc<Credential>>;

    /// Renew `stale` unless it has already been replaced.
    ///
    /// Callers that saw the same credential rejected converge on one renewal:
    /// whoever arrives after the replacement receives the current credential
    /// without another exchange. Implementations should make the comparison
    /// and the renewal atomic; this default only checks before renewing.
    async fn refresh_if_current(
        &self,
        ctx: &Context,
        stale: &Arc<Credential>,
    ) -> Result<Arc<Credential>> {
        match self.current() {
            Some(current) if !Arc::ptr_eq(&current, stale) => Ok(current),
            _ => self.refresh(ctx).await,
        }
    }
}
