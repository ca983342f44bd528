//! Return URL normalization and error redirect construction.

use url::{Url, form_urlencoded};

use crate::config::ReturnUrlPolicy;

/// Query parameter carrying the error code on error redirects.
pub const ERROR_QUERY_PARAM: &str = "error";

/// Decides which return URLs the login flow honours.
#[derive(Debug, Clone)]
pub struct ReturnUrlGuard {
    policy: ReturnUrlPolicy,
    base_url: Url,
    default_return_url: String,
}

impl ReturnUrlGuard {
    /// Creates a guard.
    #[must_use]
    pub fn new(
        policy: ReturnUrlPolicy,
        base_url: Url,
        default_return_url: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            base_url,
            default_return_url: default_return_url.into(),
        }
    }

    /// The fallback return URL.
    #[must_use]
    pub fn default_return_url(&self) -> &str {
        &self.default_return_url
    }

    /// Returns the return URL to use for `requested`.
    ///
    /// Missing, blank or refused values fall back to the default return URL.
    #[must_use]
    pub fn normalize(&self, requested: Option<&str>) -> String {
        let Some(requested) = requested.map(str::trim).filter(|r| !r.is_empty()) else {
            tracing::debug!(
                default = %self.default_return_url,
                "No returnUrl supplied, using default"
            );
            return self.default_return_url.clone();
        };

        // control characters cannot be sent in a Location header
        if !requested.chars().any(char::is_control) && self.is_allowed(requested) {
            return requested.to_string();
        }

        tracing::warn!(
            requested = %requested,
            default = %self.default_return_url,
            "Refusing returnUrl outside this site"
        );
        self.default_return_url.clone()
    }

    fn is_allowed(&self, requested: &str) -> bool {
        match self.policy {
            ReturnUrlPolicy::Any => true,
            ReturnUrlPolicy::SameOrigin => {
                if requested.starts_with('/') {
                    // "//host" and "/\host" are protocol-relative in browsers
                    return !requested.starts_with("//") && !requested.starts_with("/\\");
                }
                Url::parse(requested)
                    .map(|url| url.origin() == self.base_url.origin())
                    .unwrap_or(false)
            }
        }
    }
}

/// Appends `error=<code>` to a return URL, using `?` or `&` as needed.
#[must_use]
pub fn append_error(return_url: &str, code: &str) -> String {
    let separator = if return_url.contains('?') { '&' } else { '?' };
    let encoded: String = form_urlencoded::byte_serialize(code.as_bytes()).collect();
    format!("{return_url}{separator}{ERROR_QUERY_PARAM}={encoded}")
}
