//! Custom account mapping strategy.
//!
//! Links an external identity to a local account, creating the account on
//! first login, and then signs the account in by username.
//!
//! Account creation runs under an [`ElevatedScope`] inside a single
//! [`AccountTransaction`]: create account, assign initial roles, create
//! profile, recompute profile, commit. Any failure rolls the transaction
//! back; the scope is released when it goes out of scope.
//!
//! [`ElevatedScope`]: crate::privilege::ElevatedScope

use std::collections::BTreeSet;
use std::sync::Arc;

use super::error::MappingError;
use super::identity::ExternalIdentity;
use crate::config::{CustomMappingConfig, MissingRolePolicy};
use crate::privilege::PrivilegeGate;
use crate::storage::{
    AccountStorage, AccountTransaction, AuthenticationOutcome, LocalAccount, Profile,
    RoleDirectory, SessionStore,
};

/// Claim names copied onto the profile of a newly created account.
const FIRST_NAME_CLAIM: &str = "first_name";
const LAST_NAME_CLAIM: &str = "last_name";
const NICKNAME_CLAIM: &str = "nickname";
const EMAIL_CLAIM: &str = "email";

/// Maps external identities to local accounts created by this service.
#[derive(Clone)]
pub struct CustomMapper {
    accounts: Arc<dyn AccountStorage>,
    roles: RoleDirectory,
    sessions: Arc<dyn SessionStore>,
    gate: PrivilegeGate,
    config: CustomMappingConfig,
}

impl CustomMapper {
    /// Creates a mapper.
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStorage>,
        roles: RoleDirectory,
        sessions: Arc<dyn SessionStore>,
        gate: PrivilegeGate,
        config: CustomMappingConfig,
    ) -> Self {
        Self {
            accounts,
            roles,
            sessions,
            gate,
            config,
        }
    }

    /// Mapping configuration.
    #[must_use]
    pub fn config(&self) -> &CustomMappingConfig {
        &self.config
    }

    /// Finds or creates the local account for `identity` and signs it in.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::AccountCreation`] or
    /// [`MappingError::RoleNotFound`] if the account could not be created
    /// (nothing is written), or [`MappingError::Storage`] if a lookup or the
    /// session store failed.
    pub async fn map(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<AuthenticationOutcome, MappingError> {
        let existing = self
            .accounts
            .find_by_external_identity(&identity.external_id, &identity.provider_name)
            .await?;

        let username = match existing {
            Some(account) => {
                tracing::debug!(
                    account_id = %account.id,
                    external_id = %identity.external_id,
                    "Found linked account"
                );
                account.username
            }
            None => self.create_account(identity).await?,
        };

        let outcome = self
            .sessions
            .authenticate_by_username(&username, self.config.persist_cookie)
            .await?;

        match &outcome {
            AuthenticationOutcome::Success(session) => tracing::info!(
                account_id = %session.account_id,
                username = %session.username,
                persist_cookie = session.persist_cookie,
                "External user signed in"
            ),
            AuthenticationOutcome::Failure(reason) => tracing::warn!(
                username = %username,
                reason = %reason,
                "Session store refused external user"
            ),
        }
        Ok(outcome)
    }

    /// Creates the account and returns its username.
    async fn create_account(&self, identity: &ExternalIdentity) -> Result<String, MappingError> {
        let scope = self.gate.elevate("create external account");
        let mut tx = self
            .accounts
            .begin(&scope)
            .await
            .map_err(MappingError::AccountCreation)?;

        tracing::debug!(
            tx_id = %tx.id(),
            scope_id = %scope.id(),
            external_id = %identity.external_id,
            "Creating account for external identity"
        );

        let account = match self.stage_account(tx.as_mut(), identity).await {
            Ok(account) => account,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                tracing::warn!(
                    external_id = %identity.external_id,
                    error = %err,
                    "Account creation rolled back"
                );
                return Err(err);
            }
        };

        match tx.commit().await {
            Ok(()) => {
                tracing::info!(
                    account_id = %account.id,
                    username = %account.username,
                    is_backend_user = account.is_backend_user,
                    roles = account.roles.len(),
                    "Created account for external identity"
                );
                Ok(account.username)
            }
            Err(err) if err.is_conflict() => {
                // A concurrent first login committed the same identity.
                let winner = self
                    .accounts
                    .find_by_external_identity(&identity.external_id, &identity.provider_name)
                    .await?;
                match winner {
                    Some(winner) => {
                        tracing::info!(
                            account_id = %winner.id,
                            external_id = %identity.external_id,
                            "Account created concurrently, using existing account"
                        );
                        Ok(winner.username)
                    }
                    None => Err(MappingError::AccountCreation(err)),
                }
            }
            Err(err) => Err(MappingError::AccountCreation(err)),
        }
    }

    async fn stage_account(
        &self,
        tx: &mut dyn AccountTransaction,
        identity: &ExternalIdentity,
    ) -> Result<LocalAccount, MappingError> {
        let mut builder = LocalAccount::builder(identity.external_id.clone())
            .external_identity(identity.external_id.clone(), identity.provider_name.clone())
            .backend_user(self.config.grants_backend_access());
        if let Some(email) = identity.claim(EMAIL_CLAIM) {
            builder = builder.email(email);
        }
        let mut account = builder.build();

        tx.create_account(account.clone())
            .await
            .map_err(MappingError::AccountCreation)?;

        let mut assigned = BTreeSet::new();
        for name in &self.config.initial_roles {
            if !assigned.insert(name.as_str()) {
                continue;
            }
            let role = self
                .roles
                .resolve(name)
                .await
                .map_err(MappingError::AccountCreation)?;
            match (role, self.config.missing_role_policy) {
                (Some(role), _) => {
                    tx.assign_role(account.id, role.clone())
                        .await
                        .map_err(MappingError::AccountCreation)?;
                    account.roles.insert(role);
                }
                (None, MissingRolePolicy::Skip) => {
                    tracing::warn!(role = %name, "Initial role not found in any provider, skipping");
                }
                (None, MissingRolePolicy::Abort) => {
                    return Err(MappingError::RoleNotFound { role: name.clone() });
                }
            }
        }

        let mut profile = Profile::new(account.id);
        profile.first_name = identity.claim(FIRST_NAME_CLAIM).map(str::to_string);
        profile.last_name = identity.claim(LAST_NAME_CLAIM).map(str::to_string);
        profile.nickname = identity.claim(NICKNAME_CLAIM).map(str::to_string);
        tx.create_profile(profile)
            .await
            .map_err(MappingError::AccountCreation)?;
        tx.recompute_profile(account.id)
            .await
            .map_err(MappingError::AccountCreation)?;

        Ok(account)
    }
}

impl std::fmt::Debug for CustomMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomMapper")
            .field("roles", &self.roles)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeAccounts, FakeSessions, FixedRoles};
    use crate::storage::LoginFailureReason;

    const PROVIDER: &str = "CustomIdentityProvider";

    fn mapper_with(
        accounts: FakeAccounts,
        config: CustomMappingConfig,
    ) -> (CustomMapper, PrivilegeGate) {
        let roles = RoleDirectory::new()
            .with_provider(FixedRoles::new("Default", &["Administrators"]))
            .with_provider(FixedRoles::new("AppRoles", &["Administrators", "BackendUsers"]));
        let gate = PrivilegeGate::new();
        let mapper = CustomMapper::new(
            Arc::new(accounts.clone()),
            roles,
            Arc::new(FakeSessions::new(accounts)),
            gate.clone(),
            config,
        );
        (mapper, gate)
    }

    fn config(roles: &[&str], policy: MissingRolePolicy) -> CustomMappingConfig {
        CustomMappingConfig {
            initial_roles: roles.iter().map(|r| r.to_string()).collect(),
            missing_role_policy: policy,
            ..CustomMappingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_first_login_creates_account() {
        let accounts = FakeAccounts::default();
        let (mapper, gate) = mapper_with(
            accounts.clone(),
            config(&["Administrators"], MissingRolePolicy::Skip),
        );

        let identity = ExternalIdentity::new("ext-123", PROVIDER);
        let outcome = mapper.map(&identity).await.unwrap();

        let session = outcome.session().unwrap();
        assert_eq!(session.username, "ext-123");
        assert!(!session.persist_cookie);

        let stored = accounts.all();
        assert_eq!(stored.len(), 1);
        let account = &stored[0];
        assert_eq!(account.username, "ext-123");
        assert!(account.is_backend_user);
        assert!(account.is_linked_to("ext-123", PROVIDER));
        assert!(account.has_role("Administrators"));
        assert_eq!(gate.active_scopes(), 0);

        let profile = accounts.find_profile(account.id).await.unwrap().unwrap();
        assert_eq!(profile.url.as_deref(), Some("/users/ext-123"));
    }

    #[tokio::test]
    async fn test_repeated_logins_are_idempotent() {
        let accounts = FakeAccounts::default();
        let (mapper, _) = mapper_with(accounts.clone(), CustomMappingConfig::default());
        let identity = ExternalIdentity::new("ext-123", PROVIDER);

        for _ in 0..3 {
            assert!(mapper.map(&identity).await.unwrap().is_success());
        }
        assert_eq!(accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_first_provider_wins_and_duplicates_ignored() {
        let accounts = FakeAccounts::default();
        let (mapper, _) = mapper_with(
            accounts.clone(),
            config(
                &["Administrators", "BackendUsers", "Administrators"],
                MissingRolePolicy::Skip,
            ),
        );
        mapper
            .map(&ExternalIdentity::new("ext-1", PROVIDER))
            .await
            .unwrap();

        let account = &accounts.all()[0];
        assert_eq!(account.roles.len(), 2);
        let admin = account
            .roles
            .iter()
            .find(|r| r.name == "Administrators")
            .unwrap();
        assert_eq!(admin.provider, "Default");
        let backend = account
            .roles
            .iter()
            .find(|r| r.name == "BackendUsers")
            .unwrap();
        assert_eq!(backend.provider, "AppRoles");
    }

    #[tokio::test]
    async fn test_missing_role_skipped() {
        let accounts = FakeAccounts::default();
        let (mapper, _) = mapper_with(
            accounts.clone(),
            config(&["Ghosts", "Administrators"], MissingRolePolicy::Skip),
        );
        let outcome = mapper
            .map(&ExternalIdentity::new("ext-1", PROVIDER))
            .await
            .unwrap();
        assert!(outcome.is_success());

        let account = &accounts.all()[0];
        assert!(account.has_role("Administrators"));
        assert!(!account.has_role("Ghosts"));
    }

    #[tokio::test]
    async fn test_missing_role_aborts_without_writes() {
        let accounts = FakeAccounts::default();
        let (mapper, gate) = mapper_with(
            accounts.clone(),
            config(&["Administrators", "Ghosts"], MissingRolePolicy::Abort),
        );
        let err = mapper
            .map(&ExternalIdentity::new("ext-1", PROVIDER))
            .await
            .unwrap_err();

        assert!(matches!(err, MappingError::RoleNotFound { ref role } if role == "Ghosts"));
        assert_eq!(err.code(), "AccountCreationFailed");
        assert_eq!(accounts.len(), 0);
        assert_eq!(gate.active_scopes(), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_releases_scope() {
        let accounts = FakeAccounts::failing_commits();
        let (mapper, gate) = mapper_with(accounts.clone(), CustomMappingConfig::default());

        let err = mapper
            .map(&ExternalIdentity::new("ext-1", PROVIDER))
            .await
            .unwrap_err();
        assert!(matches!(err, MappingError::AccountCreation(_)));
        assert_eq!(accounts.len(), 0);
        assert!(!gate.is_elevated());
    }

    #[tokio::test]
    async fn test_non_backend_roles() {
        let accounts = FakeAccounts::default();
        let (mapper, _) = mapper_with(
            accounts.clone(),
            config(&["Editors"], MissingRolePolicy::Skip),
        );
        mapper
            .map(&ExternalIdentity::new("ext-1", PROVIDER))
            .await
            .unwrap();
        assert!(!accounts.all()[0].is_backend_user);
    }

    #[tokio::test]
    async fn test_inactive_account_is_refused() {
        let accounts = FakeAccounts::default();
        accounts.insert(
            LocalAccount::builder("ext-1")
                .external_identity("ext-1", PROVIDER)
                .active(false)
                .build(),
        );
        let (mapper, _) = mapper_with(accounts.clone(), CustomMappingConfig::default());

        let outcome = mapper
            .map(&ExternalIdentity::new("ext-1", PROVIDER))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AuthenticationOutcome::Failure(LoginFailureReason::UserInactive)
        );
        assert_eq!(accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_profile_fields_from_claims() {
        let accounts = FakeAccounts::default();
        let (mapper, _) = mapper_with(accounts.clone(), CustomMappingConfig::default());
        let identity = ExternalIdentity::new("ext-1", PROVIDER)
            .with_claim("first_name", "Jane")
            .with_claim("nickname", "Jane Doe")
            .with_claim("email", "jane@example.com");
        mapper.map(&identity).await.unwrap();

        let account = &accounts.all()[0];
        assert_eq!(account.email.as_deref(), Some("jane@example.com"));
        let profile = accounts.find_profile(account.id).await.unwrap().unwrap();
        assert_eq!(profile.first_name.as_deref(), Some("Jane"));
        assert_eq!(profile.url.as_deref(), Some("/users/jane-doe"));
    }

    #[tokio::test]
    async fn test_concurrent_first_logins_create_one_account() {
        let accounts = FakeAccounts::default();
        let (mapper, gate) = mapper_with(accounts.clone(), CustomMappingConfig::default());
        let mapper = Arc::new(mapper);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mapper = Arc::clone(&mapper);
                tokio::spawn(async move {
                    mapper
                        .map(&ExternalIdentity::new("ext-123", PROVIDER))
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_success());
        }
        assert_eq!(accounts.len(), 1);
        assert_eq!(gate.active_scopes(), 0);
    }
}
