//! The retry loop: attach the credential, send, classify, back off or replay.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::api::HttpApi;
use crate::classify::{ErrorClassifier, Outcome};
use crate::config::ClientConfig;
use crate::context::Context;
use crate::credential::{Credential, CredentialSource};
use crate::error::{Error, ErrorKind, Result};
use crate::request::ApiRequest;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Executes logical calls against the platform.
///
/// One executor is shared by every caller of a client. It holds no mutable
/// state of its own: the credential lives in the [`CredentialSource`], and
/// retry bookkeeping is local to each call.
///
/// Per call, the executor recovers exactly two conditions: retryable
/// classifications (bounded, jittered backoff) and a single rejected session
/// (one refresh, one replay that does not count as an attempt). Everything
/// else is returned to the caller as classified.
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
    classifier: ErrorClassifier,
    retry: RetryConfig,
    config: ClientConfig,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("classifier", &self.classifier)
            .field("retry", &self.retry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
        config: ClientConfig,
    ) -> Self {
        Self {
            transport,
            credentials,
            classifier: ErrorClassifier::with_fatal_server_statuses(
                config.fatal_server_statuses.iter().copied(),
            ),
            retry: config.retry_config(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api_version(&self) -> &str {
        &self.config.api_version
    }

    /// The credential source this executor reads from.
    pub fn credentials(&self) -> &Arc<dyn CredentialSource> {
        &self.credentials
    }

    /// A usable credential: the current one, renewed if it is about to
    /// expire, or a fresh one if none exists yet.
    async fn credential(&self, ctx: &Context) -> Result<Arc<Credential>> {
        match self.credentials.current() {
            Some(credential) if !credential.is_expired() => Ok(credential),
            Some(stale) => {
                debug!("Credential past its expiry margin, refreshing");
                self.credentials.refresh_if_current(ctx, &stale).await
            }
            None => self.credentials.authenticate(ctx).await,
        }
    }

    fn build(&self, request: &ApiRequest, body: &Bytes, credential: &Credential) -> HttpRequest {
        let mut http = HttpRequest::new(request.method, request.url(credential.base_address()))
            .header("Authorization", credential.authorization_header())
            .body(body.clone());

        let has = |name: &str| {
            request
                .headers
                .iter()
                .any(|(key, _)| key.eq_ignore_ascii_case(name))
        };
        if !has("accept") {
            http = http.header("Accept", "application/json");
        }
        if !has("content-type") {
            if let Some(content_type) = request.body.content_type() {
                http = http.header("Content-Type", content_type);
            }
        }
        for (name, value) in &request.headers {
            http = http.header(name.clone(), value.clone());
        }
        http
    }

    /// Execute a logical call.
    ///
    /// Returns the successful response, or the classified error. When the
    /// attempt budget runs out the error is `RetriesExhausted` with the final
    /// attempt's error as its source.
    #[instrument(skip(self, ctx, request), fields(method = %request.method, path = %request.path))]
    pub async fn execute(&self, ctx: &Context, request: ApiRequest) -> Result<HttpResponse> {
        ctx.check()?;

        // Encoded once; every retry and the replay send identical bytes
        let body = request.body.encode()?;
        let mut credential = self.credential(ctx).await?;
        let mut policy = RetryPolicy::new(self.retry.clone());
        let mut refreshed = false;

        loop {
            let http = self.build(&request, &body, &credential);
            if self.config.enable_tracing {
                debug!(
                    attempt = policy.attempts() + 1,
                    url = %http.url,
                    bytes = http.body.len(),
                    "Sending request"
                );
            }

            let (outcome, response) = match ctx.run(self.transport.send(http)).await? {
                Ok(response) => (
                    self.classifier
                        .classify(response.status, &response.headers, &response.body),
                    Some(response),
                ),
                Err(err) => (self.classifier.classify_transport(err), None),
            };

            match outcome {
                // Only a received response classifies as a success
                Outcome::Success(received) => {
                    return Ok(response.unwrap_or_else(|| HttpResponse::new(200, received)));
                }
                Outcome::Fatal(error) => return Err(error),
                Outcome::AuthExpired(error) => {
                    if refreshed {
                        return Err(error);
                    }
                    refreshed = true;
                    info!(error = %error, "Session rejected, refreshing credential and replaying");
                    credential = match self.credentials.refresh_if_current(ctx, &credential).await {
                        Ok(renewed) => renewed,
                        // The platform's rejection is the actionable error here
                        Err(refresh_error) if refresh_error.is_refresh_unsupported() => {
                            return Err(Error::with_source(error.kind, refresh_error));
                        }
                        Err(refresh_error) => return Err(refresh_error),
                    };
                }
                Outcome::Retryable {
                    error,
                    suggested_delay,
                } => match policy.next_delay(suggested_delay) {
                    Some(delay) => {
                        warn!(
                            attempt = policy.attempts(),
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Request failed, retrying"
                        );
                        ctx.sleep(delay).await?;
                    }
                    None => {
                        warn!(attempts = policy.attempts(), error = %error, "Retries exhausted");
                        return Err(Error::with_source(
                            ErrorKind::RetriesExhausted {
                                attempts: policy.attempts(),
                            },
                            error,
                        ));
                    }
                },
            }
        }
    }

    /// Execute and deserialize a JSON response body.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        request: ApiRequest,
    ) -> Result<T> {
        let response = self.execute(ctx, request).await?;
        response.json()
    }
}

#[async_trait]
impl HttpApi for RequestExecutor {
    async fn call(&self, ctx: &Context, request: ApiRequest) -> Result<HttpResponse> {
        self.execute(ctx, request).await
    }
}
