//! # sf-client
//!
//! Core request pipeline for Salesforce APIs.
//!
//! This crate provides the engineered part of the client:
//! - A pluggable [`Transport`] (reqwest-backed by default) so the pipeline can
//!   be exercised against a fake without network access
//! - A pure [`ErrorClassifier`] that turns status/headers/body into an [`Outcome`]
//! - Bounded retry with exponentially growing, jittered backoff
//! - A single refresh-and-replay per logical call when the platform rejects
//!   the session
//! - Cancellation and deadlines on every suspension point via [`Context`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Application Layer                        │
//! │  (sf-bulk, thin endpoint wrappers)                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  HttpApi (get/post/patch/put/delete)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   RequestExecutor                           │
//! │  - Attaches the current Credential                          │
//! │  - Classifies every attempt, retries with backoff           │
//! │  - One refresh-and-replay on 401                            │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                              │
//!                 ▼                              ▼
//! ┌───────────────────────────┐   ┌─────────────────────────────┐
//! │     CredentialSource      │   │         Transport           │
//! │  (sf-auth provider)       │   │  (reqwest or a test fake)   │
//! └───────────────────────────┘   └─────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use busbar_sf_client::{ClientConfig, Context, RequestExecutor, ReqwestTransport};
//!
//! let config = ClientConfig::default();
//! let transport = Arc::new(ReqwestTransport::new(&config)?);
//! let executor = RequestExecutor::new(transport, provider, config);
//!
//! let ctx = Context::with_timeout(std::time::Duration::from_secs(30));
//! let body = executor.get(&ctx, "/services/data/v62.0/limits").await?;
//! ```

mod api;
mod classify;
mod config;
mod context;
mod credential;
mod error;
mod executor;
mod request;
mod retry;
mod transport;

pub use api::HttpApi;
pub use classify::{parse_error_body, ErrorClassifier, Outcome};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use context::Context;
pub use credential::{Credential, CredentialSource, EXPIRY_SAFETY_MARGIN};
pub use error::{codes, sanitize_error_message, ApiErrorDetail, Error, ErrorKind, Result};
pub use executor::RequestExecutor;
pub use request::{ApiRequest, RequestBody, RequestMethod};
pub use retry::{BackoffStrategy, RetryConfig, RetryPolicy};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

/// Default Salesforce API version
pub const DEFAULT_API_VERSION: &str = "62.0";

/// User-Agent string for the client
pub const USER_AGENT: &str = concat!("busbar-sf-api/", env!("CARGO_PKG_VERSION"));
