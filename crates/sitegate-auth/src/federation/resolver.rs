//! Identity resolver interface.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::error::ResolutionError;
use super::identity::ExternalIdentity;

/// Query parameter carrying the post-login redirect target.
pub const RETURN_URL_PARAM: &str = "returnUrl";

/// Query parameters of a provider callback.
///
/// Duplicate keys keep the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackParams {
    params: BTreeMap<String, String>,
}

impl CallbackParams {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the parameter set from key/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            params: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parses the query string of a URL.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self::from_pairs(url.query_pairs().into_owned())
    }

    /// Adds or replaces a parameter.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The `returnUrl` parameter, if present.
    #[must_use]
    pub fn return_url(&self) -> Option<&str> {
        self.get(RETURN_URL_PARAM)
    }

    /// Iterates the parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Resolves provider callbacks to external identities.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Name of the provider, stored on linked accounts.
    fn provider_name(&self) -> &str;

    /// Builds the provider login URL that eventually redirects the browser
    /// back to `callback_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::InvalidUrl`] if the URL cannot be built.
    fn authorization_url(&self, callback_url: &Url) -> Result<Url, ResolutionError>;

    /// Validates the callback and extracts the authenticated identity.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] if the callback is not authentic, the
    /// provider reported an error, or the subject identifier is missing.
    async fn resolve(&self, params: &CallbackParams) -> Result<ExternalIdentity, ResolutionError>;
}
