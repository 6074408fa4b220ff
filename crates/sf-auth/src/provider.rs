//! Credential ownership and single-flight renewal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use busbar_sf_client::{
    Context, Credential, CredentialSource, HttpRequest, RequestBody, RequestMethod, Transport,
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::error::{Error, ErrorKind, Result};
use crate::oauth::{grant_form, oauth_error, TokenResponse};
use crate::strategy::AuthStrategy;

/// Outcome of the most recent exchange, shared with callers that waited on it.
#[derive(Default)]
struct ExchangeState {
    last: Option<Result<Arc<Credential>>>,
}

/// Owns the current credential and obtains new ones with its strategy.
///
/// Reads never wait on an exchange. Exchanges are serialized: callers that
/// queue behind an in-flight exchange receive its result instead of starting
/// their own, so N concurrent refreshes cost one round trip to the token
/// endpoint and all N see the same credential or the same error.
pub struct CredentialProvider {
    strategy: AuthStrategy,
    token_url: String,
    transport: Arc<dyn Transport>,
    current: RwLock<Option<Arc<Credential>>>,
    exchange: Mutex<ExchangeState>,
    // Bumped after every completed exchange
    generation: AtomicU64,
}

impl std::fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("strategy", &self.strategy)
            .field("token_url", &self.token_url)
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

impl CredentialProvider {
    /// Create a provider. A pre-issued token is available immediately.
    pub fn new(
        strategy: AuthStrategy,
        token_url: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let initial = match &strategy {
            AuthStrategy::PreIssued {
                access_token,
                instance_url,
            } => Some(Arc::new(Credential::new(
                access_token.clone(),
                instance_url.clone(),
            ))),
            _ => None,
        };

        Self {
            strategy,
            token_url: token_url.into(),
            transport,
            current: RwLock::new(initial),
            exchange: Mutex::new(ExchangeState::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn strategy(&self) -> &AuthStrategy {
        &self.strategy
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Latest known credential.
    pub fn current(&self) -> Option<Arc<Credential>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store(&self, credential: Arc<Credential>) {
        match self.current.write() {
            Ok(mut guard) => *guard = Some(credential),
            Err(poisoned) => *poisoned.into_inner() = Some(credential),
        }
    }

    /// Obtain a credential with the configured strategy.
    #[instrument(skip(self, ctx), fields(strategy = self.strategy.name()))]
    pub async fn authenticate(&self, ctx: &Context) -> Result<Arc<Credential>> {
        if let AuthStrategy::PreIssued { .. } = self.strategy {
            return self
                .current()
                .ok_or_else(|| Error::new(ErrorKind::InvalidCredentials("no access token".into())));
        }
        self.single_flight(ctx, None).await
    }

    /// Renew the credential.
    ///
    /// The password strategy re-authenticates from scratch, the refresh-token
    /// strategy exchanges its refresh token again, and a pre-issued token
    /// fails with [`ErrorKind::RefreshNotSupported`].
    #[instrument(skip(self, ctx), fields(strategy = self.strategy.name()))]
    pub async fn refresh(&self, ctx: &Context) -> Result<Arc<Credential>> {
        if !self.strategy.supports_refresh() {
            return Err(Error::new(ErrorKind::RefreshNotSupported));
        }
        self.single_flight(ctx, None).await
    }

    /// Renew the credential a caller saw rejected, unless it was already replaced.
    ///
    /// Requests that went out with the same token may see it rejected at
    /// different times, some only after another caller's renewal finished.
    /// Comparing against `stale` under the exchange lock makes all of them
    /// converge on a single exchange.
    #[instrument(skip(self, ctx, stale), fields(strategy = self.strategy.name()))]
    pub async fn refresh_if_current(
        &self,
        ctx: &Context,
        stale: &Arc<Credential>,
    ) -> Result<Arc<Credential>> {
        if !self.strategy.supports_refresh() {
            return Err(Error::new(ErrorKind::RefreshNotSupported));
        }
        self.single_flight(ctx, Some(stale)).await
    }

    async fn single_flight(
        &self,
        ctx: &Context,
        stale: Option<&Arc<Credential>>,
    ) -> Result<Arc<Credential>> {
        let observed = self.generation.load(Ordering::Acquire);
        let mut state = ctx.run(self.exchange.lock()).await?;

        if self.generation.load(Ordering::Acquire) != observed {
            if let Some(result) = &state.last {
                debug!("Reusing result of concurrent token exchange");
                return result.clone();
            }
        }
        if let (Some(stale), Some(current)) = (stale, self.current()) {
            if !Arc::ptr_eq(stale, &current) {
                debug!("Rejected credential already replaced, reusing current one");
                return Ok(current);
            }
        }

        let result = self.exchange_token(ctx).await;

        // A cancelled leader leaves nothing to share; the next waiter exchanges itself
        if matches!(&result, Err(err) if err.is_cancellation()) {
            return result;
        }
        if let Ok(credential) = &result {
            self.store(credential.clone());
        }
        state.last = Some(result.clone());
        self.generation.fetch_add(1, Ordering::AcqRel);
        result
    }

    async fn exchange_token(&self, ctx: &Context) -> Result<Arc<Credential>> {
        let current = self.current();
        let refresh_token = current.as_deref().and_then(Credential::refresh_token);
        let form = grant_form(&self.strategy, refresh_token)
            .ok_or_else(|| Error::new(ErrorKind::RefreshNotSupported))?;

        info!(
            strategy = self.strategy.name(),
            token_url = %self.token_url,
            "Exchanging credentials at token endpoint"
        );

        let body = RequestBody::form(form);
        let request = HttpRequest::new(RequestMethod::Post, self.token_url.clone())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(body.encode()?);

        let response = ctx.run(self.transport.send(request)).await??;
        if !response.is_success() {
            return Err(oauth_error(response.status, &response.body));
        }

        let token: TokenResponse = serde_json::from_slice(&response.body)?;
        // The endpoint only returns a refresh token when it rotates one
        let fallback = refresh_token.or(match &self.strategy {
            AuthStrategy::RefreshToken { refresh_token, .. } => Some(refresh_token.as_str()),
            _ => None,
        });
        let credential = token.into_credential(fallback)?;

        debug!(instance_url = %credential.base_address(), "Token exchange succeeded");
        Ok(Arc::new(credential))
    }
}

#[async_trait]
impl CredentialSource for CredentialProvider {
    fn current(&self) -> Option<Arc<Credential>> {
        CredentialProvider::current(self)
    }

    async fn authenticate(&self, ctx: &Context) -> busbar_sf_client::Result<Arc<Credential>> {
        Ok(CredentialProvider::authenticate(self, ctx).await?)
    }

    async fn refresh(&self, ctx: &Context) -> busbar_sf_client::Result<Arc<Credential>> {
        Ok(CredentialProvider::refresh(self, ctx).await?)
    }

    async fn refresh_if_current(
        &self,
        ctx: &Context,
        stale: &Arc<Credential>,
    ) -> busbar_sf_client::Result<Arc<Credential>> {
        Ok(CredentialProvider::refresh_if_current(self, ctx, stale).await?)
    }
}
