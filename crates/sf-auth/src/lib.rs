//! # sf-auth
//!
//! Credential acquisition and renewal for Salesforce APIs.
//!
//! ## Security
//!
//! - Sensitive data (tokens, secrets, passwords) are redacted in Debug output
//! - Tracing skips credential parameters
//! - Error messages avoid echoing credential data
//!
//! ## Supported Authentication Methods
//!
//! Exactly one [`AuthStrategy`] is active per [`CredentialProvider`]:
//!
//! - **OAuth 2.0 Refresh Token** - exchange a stored refresh token
//! - **OAuth 2.0 Username-Password** - re-authenticates on every renewal
//! - **Pre-issued access token** - used as-is; cannot be renewed
//!
//! Renewal is single-flight: concurrent callers share one exchange.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use busbar_sf_auth::{AuthStrategy, CredentialProvider, PRODUCTION_LOGIN_URL};
//! use busbar_sf_client::{ClientConfig, Context, ReqwestTransport};
//!
//! let transport = Arc::new(ReqwestTransport::new(&ClientConfig::default())?);
//! let provider = CredentialProvider::new(
//!     AuthStrategy::from_env()?,
//!     busbar_sf_auth::token_url(PRODUCTION_LOGIN_URL),
//!     transport,
//! );
//! let credential = provider.authenticate(&Context::background()).await?;
//! ```

mod error;
mod oauth;
mod provider;
mod strategy;

pub use error::{Error, ErrorKind, Result};
pub use oauth::{token_url, TokenResponse, TOKEN_PATH};
pub use provider::CredentialProvider;
pub use strategy::AuthStrategy;

/// Default Salesforce login URL for production.
pub const PRODUCTION_LOGIN_URL: &str = "https://login.salesforce.com";

/// Default Salesforce login URL for sandbox.
pub const SANDBOX_LOGIN_URL: &str = "https://test.salesforce.com";
