//! Account mapper strategy selection.

use std::sync::Arc;

use super::custom::CustomMapper;
use super::delegated::DelegatedMapper;
use super::error::MappingError;
use super::identity::ExternalIdentity;
use crate::config::MappingConfig;
use crate::privilege::PrivilegeGate;
use crate::storage::{
    AccountStorage, AuthenticationOutcome, RoleDirectory, SessionStore, SignInSubsystem,
};

/// Stores the mappers depend on.
#[derive(Clone)]
pub struct MapperCollaborators {
    /// Local account store.
    pub accounts: Arc<dyn AccountStorage>,
    /// Ordered role providers.
    pub roles: RoleDirectory,
    /// Password-less session issuance.
    pub sessions: Arc<dyn SessionStore>,
    /// Host claims sign-in entry point.
    pub sign_in: Arc<dyn SignInSubsystem>,
    /// Gate issuing elevated scopes for account creation.
    pub gate: PrivilegeGate,
}

/// The configured account mapping strategy.
#[derive(Debug, Clone)]
pub enum AccountMapper {
    /// Create and link local accounts directly.
    Custom(CustomMapper),
    /// Delegate to the host sign-in subsystem.
    Delegated(DelegatedMapper),
}

impl AccountMapper {
    /// Builds the mapper selected by `config`.
    #[must_use]
    pub fn from_config(config: &MappingConfig, collaborators: MapperCollaborators) -> Self {
        match config {
            MappingConfig::Custom(cfg) => Self::Custom(CustomMapper::new(
                collaborators.accounts,
                collaborators.roles,
                collaborators.sessions,
                collaborators.gate,
                cfg.clone(),
            )),
            MappingConfig::Delegated(cfg) => {
                Self::Delegated(DelegatedMapper::new(collaborators.sign_in, cfg.clone()))
            }
        }
    }

    /// Strategy name, for logging.
    #[must_use]
    pub fn strategy(&self) -> &'static str {
        match self {
            Self::Custom(_) => "custom",
            Self::Delegated(_) => "delegated",
        }
    }

    /// Maps `identity` to a signed-in local account.
    ///
    /// # Errors
    ///
    /// Returns a [`MappingError`] if the account could not be created or a
    /// store failed.
    pub async fn map(
        &self,
        identity: &ExternalIdentity,
        return_url: &str,
    ) -> Result<AuthenticationOutcome, MappingError> {
        match self {
            Self::Custom(mapper) => mapper.map(identity).await,
            Self::Delegated(mapper) => mapper.map(identity, return_url).await,
        }
    }
}
