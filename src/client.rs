//! Connection facade: one provider, one executor, shared by every caller.

use std::sync::Arc;

use tracing::{info, instrument};

use busbar_sf_auth::{AuthStrategy, CredentialProvider};
use busbar_sf_client::{
    Context, Credential, CredentialSource, RequestExecutor, ReqwestTransport, Transport,
};

use crate::config::Config;
use crate::error::{Error, ErrorKind, Result};

/// An authenticated connection to one org.
///
/// Cloning is cheap; clones share the credential provider and executor, so
/// a session rejection seen by any clone triggers a single refresh.
///
/// ```rust,ignore
/// let ctx = Context::with_timeout(Duration::from_secs(60));
/// let client = Client::connect(&ctx, Config::from_env()?).await?;
/// let limits = client.executor().get(&ctx, "/services/data/v62.0/limits").await?;
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    provider: Arc<CredentialProvider>,
    executor: Arc<RequestExecutor>,
}

impl Client {
    /// Validate `config`, build the reqwest transport and authenticate.
    pub async fn connect(ctx: &Context, config: Config) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(ReqwestTransport::new(&config.client)?);
        Self::connect_with_transport(ctx, config, transport).await
    }

    /// Like [`connect`](Self::connect) over a caller-supplied transport.
    #[instrument(skip_all, fields(login_url = %config.login_url))]
    pub async fn connect_with_transport(
        ctx: &Context,
        config: Config,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        let token_url = config.token_url();
        let Config {
            strategy, client, ..
        } = config;
        let strategy: AuthStrategy = strategy.ok_or_else(|| {
            Error::new(ErrorKind::Config(
                "an authentication strategy is required".to_string(),
            ))
        })?;
        let strategy_name = strategy.name();

        let provider = Arc::new(CredentialProvider::new(
            strategy,
            token_url,
            transport.clone(),
        ));
        let credential = provider.authenticate(ctx).await?;
        info!(
            strategy = strategy_name,
            instance_url = credential.base_address(),
            "Connected"
        );

        let executor = Arc::new(RequestExecutor::new(
            transport,
            provider.clone() as Arc<dyn CredentialSource>,
            client,
        ));
        Ok(Self { provider, executor })
    }

    /// Force a credential renewal, e.g. after an out-of-band revocation.
    pub async fn refresh_token(&self, ctx: &Context) -> Result<Arc<Credential>> {
        Ok(self.provider.refresh(ctx).await?)
    }

    /// The credential currently in use.
    pub fn credential(&self) -> Option<Arc<Credential>> {
        self.provider.current()
    }

    /// Base address of the authenticated org.
    pub fn instance_url(&self) -> Option<String> {
        self.credential()
            .map(|credential| credential.base_address().to_string())
    }

    pub fn api_version(&self) -> &str {
        self.executor.api_version()
    }

    /// The shared request pipeline, for endpoint calls of any kind.
    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    pub fn provider(&self) -> &Arc<CredentialProvider> {
        &self.provider
    }

    /// Bulk API 2.0 jobs over this connection.
    #[cfg(feature = "bulk")]
    pub fn bulk(&self) -> busbar_sf_bulk::BulkJobController {
        busbar_sf_bulk::BulkJobController::from_executor(self.executor.clone())
    }
}
