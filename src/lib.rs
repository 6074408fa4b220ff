//! # busbar-sf
//!
//! A resilient request pipeline for Salesforce APIs.
//!
//! ## Security
//!
//! - Sensitive data (tokens, secrets) are redacted in Debug output
//! - Tracing/logging skips credential parameters
//! - Error messages sanitize any credential data
//!
//! ## Crates
//!
//! - **busbar-sf-client** - Request pipeline: transport, error classification,
//!   retry with jittered backoff, refresh-and-replay on session expiry,
//!   cancellation
//! - **busbar-sf-auth** - Credential provider: refresh token, username-password
//!   and pre-issued token strategies with single-flight renewal
//! - **busbar-sf-bulk** - Bulk API 2.0: ingest and query job lifecycle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use busbar_sf::{Client, Config, Context};
//! use busbar_sf::bulk::{BulkOperation, CreateIngestJobRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = Context::with_timeout(Duration::from_secs(600));
//!     let client = Client::connect(&ctx, Config::from_env()?).await?;
//!
//!     let bulk = client.bulk();
//!     let job = bulk
//!         .create_job(&ctx, &CreateIngestJobRequest::new("Account", BulkOperation::Insert))
//!         .await?;
//!     bulk.upload(&ctx, &job.id, "Name\nAcme\n").await?;
//!     bulk.close(&ctx, &job.id).await?;
//!     let job = bulk.await_completion(&ctx, &job.id, Duration::from_secs(5)).await?;
//!     println!("{} processed, {} failed", job.number_records_processed, job.number_records_failed);
//!     Ok(())
//! }
//! ```

#[path = "client.rs"]
mod connection;
mod config;
mod error;

pub use connection::Client;
pub use config::Config;
pub use error::{Error, ErrorKind, Result};

// Re-export all crates for convenient access
pub use busbar_sf_auth as auth;
#[cfg(feature = "bulk")]
pub use busbar_sf_bulk as bulk;
pub use busbar_sf_client as client;

// Re-export commonly used types at the top level
pub use busbar_sf_auth::AuthStrategy;
pub use busbar_sf_client::{ClientConfig, Context, Credential, HttpApi, RetryConfig};
