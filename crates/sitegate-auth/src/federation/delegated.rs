//! Delegated account mapping strategy.
//!
//! Hands the resolved identity to the host platform's claims sign-in
//! subsystem, which locates or auto-provisions the account using its own
//! claim mappings. This mapper writes nothing itself.

use std::sync::Arc;

use super::claims::{AuthenticationProperties, ClaimsIdentity, EXTERNAL_PROVIDER_ITEM, SUBJECT_CLAIM};
use super::error::MappingError;
use super::identity::ExternalIdentity;
use crate::config::DelegatedMappingConfig;
use crate::storage::{AuthenticationOutcome, SignInSubsystem};

/// Maps external identities through the host sign-in subsystem.
#[derive(Clone)]
pub struct DelegatedMapper {
    sign_in: Arc<dyn SignInSubsystem>,
    config: DelegatedMappingConfig,
}

impl DelegatedMapper {
    /// Creates a mapper.
    #[must_use]
    pub fn new(sign_in: Arc<dyn SignInSubsystem>, config: DelegatedMappingConfig) -> Self {
        Self { sign_in, config }
    }

    /// Builds the claims identity handed to the subsystem.
    #[must_use]
    pub fn claims_identity(&self, identity: &ExternalIdentity) -> ClaimsIdentity {
        let mut claims = ClaimsIdentity::new(self.config.authentication_type.clone())
            .with_claim(SUBJECT_CLAIM, identity.external_id.clone());
        for (name, value) in &identity.claims {
            if name != SUBJECT_CLAIM {
                claims.add_claim(name.clone(), value.clone());
            }
        }
        claims
    }

    /// Builds the sign-in properties for the given return URL.
    #[must_use]
    pub fn properties(&self, return_url: &str) -> AuthenticationProperties {
        AuthenticationProperties::new(return_url).with_item(
            EXTERNAL_PROVIDER_ITEM,
            self.config.registered_provider_name.clone(),
        )
    }

    /// Signs the identity in through the host subsystem.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::Storage`] if the subsystem failed.
    pub async fn map(
        &self,
        identity: &ExternalIdentity,
        return_url: &str,
    ) -> Result<AuthenticationOutcome, MappingError> {
        let claims = self.claims_identity(identity);
        let properties = self.properties(return_url);

        tracing::debug!(
            external_id = %identity.external_id,
            provider = %self.config.registered_provider_name,
            claims = claims.claims.len(),
            "Delegating sign-in to host subsystem"
        );

        let outcome = self.sign_in.sign_in(claims, properties).await?;
        if let AuthenticationOutcome::Failure(reason) = &outcome {
            tracing::warn!(
                external_id = %identity.external_id,
                reason = %reason,
                "Host sign-in refused external user"
            );
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for DelegatedMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatedMapper")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
