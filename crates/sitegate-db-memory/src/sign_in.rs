//! Claims-based sign-in subsystem.
//!
//! Implements [`SignInSubsystem`] on top of the account, role and session
//! stores. Given a claims identity it:
//!
//! 1. **Finds by external identity** - the subject linked to the provider
//! 2. **Finds by email** - links the identity to that account when enabled
//! 3. **Creates** - auto-provisions a new account when enabled
//!
//! and then issues a session for the account.
//!
//! Profile fields are taken from `ClaimsMapping:`-prefixed claims
//! (`ClaimsMapping:Profile.FirstName`, `ClaimsMapping:Profile.LastName`,
//! `ClaimsMapping:Profile.Nickname`, `ClaimsMapping:Email`).

use std::sync::Arc;

use async_trait::async_trait;
use sitegate_auth::config::ProvisioningConfig;
use sitegate_auth::federation::claims::{AuthenticationProperties, ClaimsIdentity, EMAIL_CLAIM};
use sitegate_auth::privilege::PrivilegeGate;
use sitegate_auth::storage::{
    AccountStorage, AuthenticationOutcome, LocalAccount, LoginFailureReason, Profile,
    RoleDirectory, SessionStore, SignInSubsystem, StorageError,
};

const FIRST_NAME_FIELD: &str = "Profile.FirstName";
const LAST_NAME_FIELD: &str = "Profile.LastName";
const NICKNAME_FIELD: &str = "Profile.Nickname";
const EMAIL_FIELD: &str = "Email";

/// The action taken to find the account behind a claims identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningAction {
    /// The identity was already linked to an account.
    ExistingIdentity,

    /// An account with the same email was found and linked.
    LinkedByEmail,

    /// A new account was created.
    Created,
}

impl std::fmt::Display for ProvisioningAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExistingIdentity => write!(f, "existing_identity"),
            Self::LinkedByEmail => write!(f, "linked_by_email"),
            Self::Created => write!(f, "created"),
        }
    }
}

/// Claims sign-in over the in-memory stores.
#[derive(Clone)]
pub struct ClaimsSignIn {
    accounts: Arc<dyn AccountStorage>,
    roles: RoleDirectory,
    sessions: Arc<dyn SessionStore>,
    gate: PrivilegeGate,
    config: ProvisioningConfig,
}

impl ClaimsSignIn {
    /// Creates the subsystem.
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStorage>,
        roles: RoleDirectory,
        sessions: Arc<dyn SessionStore>,
        gate: PrivilegeGate,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            accounts,
            roles,
            sessions,
            gate,
            config,
        }
    }

    /// Finds, links or creates the account for `subject`.
    ///
    /// Returns `None` when no account exists and none may be created.
    pub async fn provision(
        &self,
        identity: &ClaimsIdentity,
        subject: &str,
        provider: &str,
    ) -> Result<Option<(LocalAccount, ProvisioningAction)>, StorageError> {
        if let Some(account) = self
            .accounts
            .find_by_external_identity(subject, provider)
            .await?
        {
            return Ok(Some((account, ProvisioningAction::ExistingIdentity)));
        }

        let email = email_of(identity);
        if self.config.link_by_email
            && let Some(email) = email
            && let Some(account) = self.accounts.find_by_email(email).await?
            && account.external_id.is_none()
        {
            return match self.link(&account, subject, provider).await {
                Ok(account) => Ok(Some((account, ProvisioningAction::LinkedByEmail))),
                Err(e) if e.is_conflict() => self.winner(subject, provider).await,
                Err(e) => Err(e),
            };
        }

        if !self.config.auto_provision {
            return Ok(None);
        }

        match self.create(identity, subject, provider).await {
            Ok(account) => Ok(Some((account, ProvisioningAction::Created))),
            Err(e) if e.is_conflict() => {
                tracing::debug!(external_id = %subject, error = %e, "Lost account creation race");
                self.winner(subject, provider).await
            }
            Err(e) => Err(e),
        }
    }

    async fn winner(
        &self,
        subject: &str,
        provider: &str,
    ) -> Result<Option<(LocalAccount, ProvisioningAction)>, StorageError> {
        Ok(self
            .accounts
            .find_by_external_identity(subject, provider)
            .await?
            .map(|account| (account, ProvisioningAction::ExistingIdentity)))
    }

    async fn link(
        &self,
        account: &LocalAccount,
        subject: &str,
        provider: &str,
    ) -> Result<LocalAccount, StorageError> {
        let scope = self.gate.elevate("link external identity");
        let mut tx = self.accounts.begin(&scope).await?;
        tx.link_external_identity(account.id, subject, provider).await?;
        tx.commit().await?;

        let mut linked = account.clone();
        linked.external_id = Some(subject.to_string());
        linked.external_provider_name = Some(provider.to_string());
        Ok(linked)
    }

    async fn create(
        &self,
        identity: &ClaimsIdentity,
        subject: &str,
        provider: &str,
    ) -> Result<LocalAccount, StorageError> {
        let mut builder = LocalAccount::builder(subject).external_identity(subject, provider);
        if let Some(email) = email_of(identity) {
            builder = builder.email(email);
        }
        let mut account = builder.build();

        for name in &self.config.default_roles {
            match self.roles.resolve(name).await? {
                Some(role) => {
                    account.roles.insert(role);
                }
                None => tracing::warn!(role = %name, "Default role not found, skipping"),
            }
        }

        let mut profile = Profile::new(account.id);
        profile.first_name = identity.mapped(FIRST_NAME_FIELD).map(str::to_string);
        profile.last_name = identity.mapped(LAST_NAME_FIELD).map(str::to_string);
        profile.nickname = identity.mapped(NICKNAME_FIELD).map(str::to_string);

        let scope = self.gate.elevate("provision account");
        let mut tx = self.accounts.begin(&scope).await?;
        let staged = async {
            tx.create_account(account.clone()).await?;
            tx.create_profile(profile).await?;
            tx.recompute_profile(account.id).await
        }
        .await;
        if let Err(e) = staged {
            tx.rollback().await?;
            return Err(e);
        }
        tx.commit().await?;
        Ok(account)
    }
}

fn email_of(identity: &ClaimsIdentity) -> Option<&str> {
    identity
        .mapped(EMAIL_FIELD)
        .or_else(|| identity.find_first(EMAIL_CLAIM))
        .filter(|e| !e.is_empty())
}

#[async_trait]
impl SignInSubsystem for ClaimsSignIn {
    async fn sign_in(
        &self,
        identity: ClaimsIdentity,
        properties: AuthenticationProperties,
    ) -> Result<AuthenticationOutcome, StorageError> {
        let provider = properties
            .external_provider_name()
            .unwrap_or(&identity.authentication_type)
            .to_string();
        let Some(subject) = identity.subject() else {
            tracing::warn!(provider = %provider, "Claims identity has no subject");
            return Ok(AuthenticationOutcome::Failure(
                LoginFailureReason::UserNotFound,
            ));
        };

        let Some((account, action)) = self.provision(&identity, subject, &provider).await? else {
            tracing::info!(
                external_id = %subject,
                provider = %provider,
                "No account for external identity and auto-provisioning is disabled"
            );
            return Ok(AuthenticationOutcome::Failure(
                LoginFailureReason::UserNotFound,
            ));
        };

        tracing::info!(
            account_id = %account.id,
            external_id = %subject,
            provider = %provider,
            action = %action,
            "External identity provisioned"
        );

        let outcome = self
            .sessions
            .authenticate_by_username(&account.username, self.config.persist_cookie)
            .await?;
        Ok(match outcome {
            AuthenticationOutcome::Success(session) => AuthenticationOutcome::Success(
                session.with_return_url(properties.redirect_uri),
            ),
            failure => failure,
        })
    }
}
