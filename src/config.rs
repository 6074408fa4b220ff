//! Connection configuration: where to authenticate, how, and with which
//! pipeline settings.

use busbar_sf_auth::{AuthStrategy, PRODUCTION_LOGIN_URL, SANDBOX_LOGIN_URL};
use busbar_sf_client::ClientConfig;

use crate::error::{Error, ErrorKind, Result};

/// Everything [`Client::connect`](crate::Client::connect) needs.
///
/// ```rust,ignore
/// let config = Config::new(AuthStrategy::from_env()?)
///     .sandbox()
///     .with_client_config(ClientConfig::builder().with_api_version("61.0").build());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Login URL the token endpoint lives under.
    pub login_url: String,
    pub strategy: Option<AuthStrategy>,
    pub client: ClientConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            login_url: PRODUCTION_LOGIN_URL.to_string(),
            strategy: None,
            client: ClientConfig::default(),
        }
    }
}

impl Config {
    /// Production login with default pipeline settings.
    pub fn new(strategy: AuthStrategy) -> Self {
        Self {
            strategy: Some(strategy),
            ..Self::default()
        }
    }

    /// Authenticate against the sandbox login host.
    pub fn sandbox(mut self) -> Self {
        self.login_url = SANDBOX_LOGIN_URL.to_string();
        self
    }

    /// Authenticate against a My Domain host.
    ///
    /// Accepts a bare domain name (`acme` becomes
    /// `https://acme.my.salesforce.com`) or a full URL.
    pub fn custom_domain(mut self, domain: &str) -> Self {
        let domain = domain.trim().trim_end_matches('/');
        self.login_url = if domain.starts_with("https://") || domain.starts_with("http://") {
            domain.to_string()
        } else if domain.contains('.') {
            format!("https://{domain}")
        } else {
            format!("https://{domain}.my.salesforce.com")
        };
        self
    }

    pub fn with_login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = url.into();
        self
    }

    pub fn with_strategy(mut self, strategy: AuthStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_client_config(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    /// OAuth token endpoint below the login URL.
    pub fn token_url(&self) -> String {
        busbar_sf_auth::token_url(&self.login_url)
    }

    /// Build from `SF_*` / `SALESFORCE_*` environment variables.
    ///
    /// The strategy follows [`AuthStrategy::from_env`]. In addition
    /// `SF_LOGIN_URL` overrides the login host, `SF_SANDBOX=true` selects the
    /// sandbox host and `SF_API_VERSION` sets the API version.
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

        let mut config = Self::new(AuthStrategy::from_lookup(&lookup)?);
        if var("SANDBOX").is_some_and(|value| value.eq_ignore_ascii_case("true")) {
            config = config.sandbox();
        }
        if let Some(login_url) = var("LOGIN_URL") {
            config = config.with_login_url(login_url);
        }
        if let Some(version) = var("API_VERSION") {
            config.client = ClientConfig::builder()
                .with_api_version(version)
                .build();
        }
        Ok(config)
    }

    /// Check the configuration before any network traffic.
    ///
    /// Exactly one strategy must be set with its required fields present, and
    /// the login URL must parse.
    pub fn validate(&self) -> Result<()> {
        let strategy = self.strategy.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::Config(
                "an authentication strategy is required".to_string(),
            ))
        })?;
        strategy.validate()?;

        if strategy.uses_token_endpoint() {
            url::Url::parse(&self.login_url).map_err(|e| {
                Error::with_source(
                    ErrorKind::Config(format!("login URL is not a URL: {e}")),
                    e,
                )
            })?;
        }

        self.client.validate()?;
        Ok(())
    }
}
