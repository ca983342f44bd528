//! Signed callback resolver.
//!
//! Resolves callbacks from providers that redirect back with a signed
//! assertion in the query string:
//!
//! | Parameter | Meaning |
//! |---|---|
//! | `sub` | subject identifier |
//! | `ts` | unix time the assertion was issued |
//! | `claim.<name>` | optional claims |
//! | `sig` | hex HMAC-SHA256 of the canonical string |
//! | `error` | set by the provider instead of an assertion |
//!
//! The canonical string is every parameter except `sig` and `returnUrl`,
//! sorted by key and serialized as `application/x-www-form-urlencoded`.
//! Keys and values are percent-encoded, so a value containing `&` or `=`
//! cannot be re-split into other parameters under the same signature.
//! The `state` parameter the callback URL carries is covered like any other.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::OffsetDateTime;
use url::{Url, form_urlencoded};

use super::error::ResolutionError;
use super::identity::ExternalIdentity;
use super::resolver::{CallbackParams, IdentityResolver, RETURN_URL_PARAM};
use crate::config::ExternalAuthConfig;

type HmacSha256 = Hmac<Sha256>;

/// Subject parameter.
pub const SUBJECT_PARAM: &str = "sub";
/// Timestamp parameter.
pub const TIMESTAMP_PARAM: &str = "ts";
/// Signature parameter.
pub const SIGNATURE_PARAM: &str = "sig";
/// Provider error parameter.
pub const ERROR_PARAM: &str = "error";
/// Prefix of claim parameters.
pub const CLAIM_PARAM_PREFIX: &str = "claim.";

/// Resolver for HMAC-signed provider callbacks.
#[derive(Clone)]
pub struct SignedCallbackResolver {
    provider_name: String,
    authorization_endpoint: Url,
    extra_params: BTreeMap<String, String>,
    secret: Vec<u8>,
    max_age: Duration,
    clock_skew: Duration,
}

impl SignedCallbackResolver {
    /// Creates a resolver for the given provider.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::InvalidUrl`] if the endpoint is not a URL.
    pub fn new(
        provider_name: impl Into<String>,
        authorization_endpoint: &str,
        secret: impl Into<Vec<u8>>,
    ) -> Result<Self, ResolutionError> {
        Ok(Self {
            provider_name: provider_name.into(),
            authorization_endpoint: Url::parse(authorization_endpoint)?,
            extra_params: BTreeMap::new(),
            secret: secret.into(),
            max_age: Duration::from_secs(300),
            clock_skew: Duration::from_secs(60),
        })
    }

    /// Creates a resolver from the external provider configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::InvalidUrl`] if the endpoint is not a URL.
    pub fn from_config(config: &ExternalAuthConfig) -> Result<Self, ResolutionError> {
        Ok(Self::new(
            config.provider_name.clone(),
            &config.authorization_endpoint,
            config.shared_secret.as_bytes(),
        )?
        .with_extra_params(config.extra_auth_params.clone())
        .with_max_age(config.max_assertion_age)
        .with_clock_skew(config.clock_skew))
    }

    /// Sets additional parameters sent to the provider's login page.
    #[must_use]
    pub fn with_extra_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.extra_params = params;
        self
    }

    /// Sets the maximum assertion age.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Sets the tolerated clock skew.
    #[must_use]
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Builds the canonical string covered by the signature.
    #[must_use]
    pub fn canonical_string(params: &CallbackParams) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in params.iter() {
            if key != SIGNATURE_PARAM && key != RETURN_URL_PARAM {
                serializer.append_pair(key, value);
            }
        }
        serializer.finish()
    }

    fn mac(&self) -> HmacSha256 {
        match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
        }
    }

    /// Computes the hex signature of the given parameters.
    ///
    /// Providers (and tests) use this to sign a callback.
    #[must_use]
    pub fn sign(&self, params: &CallbackParams) -> String {
        let mut mac = self.mac();
        mac.update(Self::canonical_string(params).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn verify_signature(&self, params: &CallbackParams) -> Result<(), ResolutionError> {
        let signature = params
            .get(SIGNATURE_PARAM)
            .filter(|s| !s.is_empty())
            .ok_or(ResolutionError::MissingSignature)?;
        let signature = hex::decode(signature).map_err(|_| ResolutionError::InvalidSignature)?;

        let mut mac = self.mac();
        mac.update(Self::canonical_string(params).as_bytes());
        // constant-time comparison
        mac.verify_slice(&signature)
            .map_err(|_| ResolutionError::InvalidSignature)
    }

    fn verify_timestamp(
        &self,
        params: &CallbackParams,
        now: OffsetDateTime,
    ) -> Result<(), ResolutionError> {
        let issued_at: i64 = params
            .get(TIMESTAMP_PARAM)
            .and_then(|ts| ts.trim().parse().ok())
            .ok_or(ResolutionError::InvalidTimestamp)?;

        let age_secs = now
            .unix_timestamp()
            .checked_sub(issued_at)
            .ok_or(ResolutionError::InvalidTimestamp)?;
        let too_old = age_secs > 0 && age_secs.unsigned_abs() > self.max_age.as_secs();
        let too_new = age_secs < 0 && age_secs.unsigned_abs() > self.clock_skew.as_secs();
        if too_old || too_new {
            return Err(ResolutionError::AssertionExpired { age_secs });
        }
        Ok(())
    }

    /// Resolves a callback against an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`IdentityResolver::resolve`].
    pub fn resolve_at(
        &self,
        params: &CallbackParams,
        now: OffsetDateTime,
    ) -> Result<ExternalIdentity, ResolutionError> {
        if let Some(error) = params.get(ERROR_PARAM) {
            return Err(ResolutionError::provider_error(error));
        }

        self.verify_signature(params)?;
        self.verify_timestamp(params, now)?;

        let subject = params
            .get(SUBJECT_PARAM)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ResolutionError::MissingSubject)?;

        let mut identity = ExternalIdentity::new(subject, &self.provider_name);
        for (key, value) in params.iter() {
            if let Some(name) = key.strip_prefix(CLAIM_PARAM_PREFIX)
                && !name.is_empty()
            {
                identity.claims.insert(name.to_string(), value.to_string());
            }
        }
        Ok(identity)
    }
}

impl std::fmt::Debug for SignedCallbackResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedCallbackResolver")
            .field("provider_name", &self.provider_name)
            .field("authorization_endpoint", &self.authorization_endpoint.as_str())
            .field("extra_params", &self.extra_params)
            .field("secret", &"[REDACTED]")
            .field("max_age", &self.max_age)
            .field("clock_skew", &self.clock_skew)
            .finish()
    }
}

#[async_trait]
impl IdentityResolver for SignedCallbackResolver {
    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn authorization_url(&self, callback_url: &Url) -> Result<Url, ResolutionError> {
        let mut url = self.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(RETURN_URL_PARAM, callback_url.as_str());
            for (key, value) in &self.extra_params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn resolve(&self, params: &CallbackParams) -> Result<ExternalIdentity, ResolutionError> {
        self.resolve_at(params, OffsetDateTime::now_utc())
    }
}
