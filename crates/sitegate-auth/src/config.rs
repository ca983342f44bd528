//! External login configuration.
//!
//! Configuration types for the external identity provider, the account
//! mapping strategy, session cookies and claims provisioning.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! public_base_url = "https://cms.example.com"
//!
//! [auth.external]
//! provider_name = "CustomIdentityProvider"
//! authorization_endpoint = "https://www.myidentityprovider.com/login"
//! shared_secret = "change-me"
//! max_assertion_age = "5m"
//!
//! [auth.external.mapping]
//! strategy = "custom"
//! initial_roles = ["Administrators", "BackendUsers"]
//! missing_role_policy = "skip"
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Root configuration of the login flow.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Public base URL of this site, used to build the callback URL and to
    /// decide whether a return URL is same-origin.
    pub public_base_url: String,

    /// External identity provider and account mapping.
    pub external: ExternalAuthConfig,

    /// Session cookie settings.
    pub session: SessionConfig,

    /// Claims provisioning used by the delegated sign-in subsystem.
    pub provisioning: ProvisioningConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8080".to_string(),
            external: ExternalAuthConfig::default(),
            session: SessionConfig::default(),
            provisioning: ProvisioningConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_http_url("auth.public_base_url", &self.public_base_url)?;
        parse_http_url(
            "auth.external.authorization_endpoint",
            &self.external.authorization_endpoint,
        )?;

        if self.external.provider_name.trim().is_empty() {
            return Err(ConfigError::invalid(
                "auth.external.provider_name",
                "must not be empty",
            ));
        }
        if self.external.shared_secret.is_empty() {
            return Err(ConfigError::invalid(
                "auth.external.shared_secret",
                "must be set to the secret shared with the identity provider",
            ));
        }
        if self.external.max_assertion_age.is_zero() {
            return Err(ConfigError::invalid(
                "auth.external.max_assertion_age",
                "must be greater than zero",
            ));
        }
        if self.external.login_state_lifetime.is_zero() {
            return Err(ConfigError::invalid(
                "auth.external.login_state_lifetime",
                "must be greater than zero",
            ));
        }
        if !self.external.default_return_url.starts_with('/')
            || self.external.default_return_url.starts_with("//")
        {
            return Err(ConfigError::invalid(
                "auth.external.default_return_url",
                "must be a site-relative path",
            ));
        }
        if self.session.max_sessions == Some(0) {
            return Err(ConfigError::invalid(
                "auth.session.max_sessions",
                "must be greater than zero when set",
            ));
        }
        if self.session.cookie_name.is_empty()
            || self.session.csrf_cookie_name.is_empty()
            || self.session.state_cookie_name.is_empty()
        {
            return Err(ConfigError::invalid(
                "auth.session",
                "cookie names must not be empty",
            ));
        }
        Ok(())
    }

    /// Parsed public base URL.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the URL is not a valid http(s) URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        parse_http_url("auth.public_base_url", &self.public_base_url)
    }
}

fn parse_http_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::invalid(field, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(field, "must be an http(s) URL"));
    }
    Ok(url)
}

/// External identity provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExternalAuthConfig {
    /// Provider name stored on accounts linked by this flow. Separates
    /// accounts of different external providers.
    pub provider_name: String,

    /// The provider's login page.
    pub authorization_endpoint: String,

    /// Additional query parameters sent to the provider's login page.
    pub extra_auth_params: BTreeMap<String, String>,

    /// Secret shared with the provider, used to verify signed callbacks.
    pub shared_secret: String,

    /// Maximum age of a signed callback assertion.
    #[serde(with = "humantime_serde")]
    pub max_assertion_age: Duration,

    /// Tolerated clock difference with the provider.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,

    /// How long a login started at the login path can be completed.
    #[serde(with = "humantime_serde")]
    pub login_state_lifetime: Duration,

    /// Which return URLs are honoured.
    pub return_url_policy: ReturnUrlPolicy,

    /// Redirect target used when the return URL is missing or refused.
    pub default_return_url: String,

    /// Account mapping strategy.
    pub mapping: MappingConfig,
}

impl Default for ExternalAuthConfig {
    fn default() -> Self {
        Self {
            provider_name: "CustomIdentityProvider".to_string(),
            authorization_endpoint: "https://www.myidentityprovider.com/login".to_string(),
            extra_auth_params: BTreeMap::new(),
            shared_secret: String::new(),
            max_assertion_age: Duration::from_secs(300), // 5 minutes
            clock_skew: Duration::from_secs(60),
            login_state_lifetime: Duration::from_secs(600), // 10 minutes
            return_url_policy: ReturnUrlPolicy::default(),
            default_return_url: "/".to_string(),
            mapping: MappingConfig::default(),
        }
    }
}

/// Which return URLs the login flow redirects to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnUrlPolicy {
    /// Only site-relative paths and absolute URLs on the public base URL's
    /// origin. Anything else is replaced by the default return URL.
    #[default]
    SameOrigin,
    /// Any return URL is honoured. Allows open redirects.
    Any,
}

/// Account mapping strategy, selected at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MappingConfig {
    /// This service creates and links local accounts itself.
    Custom(CustomMappingConfig),
    /// The host sign-in subsystem provisions accounts from claims.
    Delegated(DelegatedMappingConfig),
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self::Custom(CustomMappingConfig::default())
    }
}

/// Settings of the custom mapping strategy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CustomMappingConfig {
    /// Roles assigned to newly created accounts.
    pub initial_roles: Vec<String>,

    /// Roles that make an account a backend user when present in
    /// `initial_roles`.
    pub backend_roles: Vec<String>,

    /// What to do when an initial role exists in no role provider.
    pub missing_role_policy: MissingRolePolicy,

    /// Whether sign-ins issue a persistent cookie.
    pub persist_cookie: bool,
}

impl Default for CustomMappingConfig {
    fn default() -> Self {
        Self {
            initial_roles: vec!["Administrators".to_string(), "BackendUsers".to_string()],
            backend_roles: vec!["Administrators".to_string(), "BackendUsers".to_string()],
            missing_role_policy: MissingRolePolicy::default(),
            persist_cookie: false,
        }
    }
}

impl CustomMappingConfig {
    /// Returns `true` if accounts created with this configuration are
    /// backend users.
    #[must_use]
    pub fn grants_backend_access(&self) -> bool {
        self.initial_roles
            .iter()
            .any(|r| self.backend_roles.contains(r))
    }
}

/// Policy for initial roles that no role provider knows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingRolePolicy {
    /// Skip the role and keep creating the account.
    #[default]
    Skip,
    /// Abort the whole account creation transaction.
    Abort,
}

/// Settings of the delegated mapping strategy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DelegatedMappingConfig {
    /// Provider name registered with the host sign-in subsystem.
    pub registered_provider_name: String,

    /// Authentication type of the claims identity handed over.
    pub authentication_type: String,
}

impl Default for DelegatedMappingConfig {
    fn default() -> Self {
        Self {
            registered_provider_name: "MyCustomIdentityProvider".to_string(),
            authentication_type: "sitegate.external".to_string(),
        }
    }
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the session cookie.
    pub cookie_name: String,

    /// Name of the CSRF cookie used by the local login widget.
    pub csrf_cookie_name: String,

    /// Name of the cookie binding an external login to the browser that
    /// started it.
    pub state_cookie_name: String,

    /// Lifetime of persistent session cookies. Stores keep no session
    /// longer than this.
    #[serde(with = "humantime_serde")]
    pub persistent_lifetime: Duration,

    /// Maximum number of live sessions; unlimited when unset.
    pub max_sessions: Option<usize>,

    /// Set the `Secure` attribute on cookies (true in production).
    pub secure_cookies: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sitegate_session".to_string(),
            csrf_cookie_name: "sitegate_csrf".to_string(),
            state_cookie_name: "sitegate_login_state".to_string(),
            persistent_lifetime: Duration::from_secs(14 * 24 * 3600), // 14 days
            max_sessions: None,
            secure_cookies: false,
        }
    }
}

/// Claims provisioning configuration for the host sign-in subsystem.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Create accounts for unknown external identities.
    pub auto_provision: bool,

    /// Link an unknown external identity to an existing account with the
    /// same email address.
    pub link_by_email: bool,

    /// Roles assigned to auto-provisioned accounts.
    pub default_roles: Vec<String>,

    /// Whether sign-ins issue a persistent cookie.
    pub persist_cookie: bool,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            auto_provision: true,
            link_by_email: false,
            default_roles: vec!["Users".to_string()],
            persist_cookie: false,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid configuration for {field}: {message}")]
    Invalid {
        /// Dotted path of the field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

impl ConfigError {
    /// Creates an `Invalid` error.
    #[must_use]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}
