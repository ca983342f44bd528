//! Fake collaborators shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::federation::claims::{AuthenticationProperties, ClaimsIdentity};
use crate::privilege::ElevatedScope;
use crate::storage::{
    AccountStorage, AccountTransaction, AuthenticationOutcome, LocalAccount, LoginFailureReason,
    LoginSession, Profile, Role, RoleProvider, RoleRef, SessionStore, SignInSubsystem,
    StorageError,
};

#[derive(Default)]
struct State {
    accounts: HashMap<Uuid, LocalAccount>,
    profiles: HashMap<Uuid, Profile>,
}

/// Account store that stages writes and checks uniqueness at commit.
#[derive(Clone, Default)]
pub struct FakeAccounts {
    state: Arc<Mutex<State>>,
    fail_commit: Arc<Mutex<bool>>,
}

impl FakeAccounts {
    pub fn failing_commits() -> Self {
        let store = Self::default();
        *store.fail_commit.lock().unwrap() = true;
        store
    }

    pub fn insert(&self, account: LocalAccount) {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(account.id, account);
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().accounts.len()
    }

    pub fn all(&self) -> Vec<LocalAccount> {
        self.state.lock().unwrap().accounts.values().cloned().collect()
    }
}

#[async_trait]
impl AccountStorage for FakeAccounts {
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<LocalAccount>, StorageError> {
        Ok(self.state.lock().unwrap().accounts.get(&account_id).cloned())
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<LocalAccount>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state.accounts.values().find(|a| a.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<LocalAccount>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .values()
            .find(|a| a.email.as_deref() == Some(email))
            .cloned())
    }

    async fn find_by_external_identity(
        &self,
        external_id: &str,
        provider_name: &str,
    ) -> Result<Option<LocalAccount>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .values()
            .find(|a| a.is_linked_to(external_id, provider_name))
            .cloned())
    }

    async fn find_profile(&self, account_id: Uuid) -> Result<Option<Profile>, StorageError> {
        Ok(self.state.lock().unwrap().profiles.get(&account_id).cloned())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.len())
    }

    async fn begin(
        &self,
        _scope: &ElevatedScope,
    ) -> Result<Box<dyn AccountTransaction>, StorageError> {
        Ok(Box::new(FakeTransaction {
            id: Uuid::new_v4().to_string(),
            store: self.clone(),
            accounts: Vec::new(),
            links: Vec::new(),
            profiles: Vec::new(),
        }))
    }
}

struct FakeTransaction {
    id: String,
    store: FakeAccounts,
    accounts: Vec<LocalAccount>,
    links: Vec<LocalAccount>,
    profiles: Vec<Profile>,
}

#[async_trait]
impl AccountTransaction for FakeTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    async fn create_account(&mut self, account: LocalAccount) -> Result<(), StorageError> {
        self.accounts.push(account);
        Ok(())
    }

    async fn assign_role(&mut self, account_id: Uuid, role: RoleRef) -> Result<(), StorageError> {
        let account = self
            .accounts
            .iter_mut()
            .find(|a| a.id == account_id)
            .ok_or_else(|| StorageError::not_found("account not staged"))?;
        account.roles.insert(role);
        Ok(())
    }

    async fn link_external_identity(
        &mut self,
        account_id: Uuid,
        external_id: &str,
        provider_name: &str,
    ) -> Result<(), StorageError> {
        let mut account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| StorageError::not_found("account"))?;
        account.external_id = Some(external_id.to_string());
        account.external_provider_name = Some(provider_name.to_string());
        self.links.push(account);
        Ok(())
    }

    async fn create_profile(&mut self, profile: Profile) -> Result<(), StorageError> {
        self.profiles.push(profile);
        Ok(())
    }

    async fn recompute_profile(&mut self, account_id: Uuid) -> Result<(), StorageError> {
        let account = self
            .accounts
            .iter()
            .find(|a| a.id == account_id)
            .ok_or_else(|| StorageError::not_found("account not staged"))?;
        for profile in self.profiles.iter_mut().filter(|p| p.account_id == account_id) {
            profile.recompute_url(account);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let FakeTransaction {
            store,
            accounts,
            links,
            profiles,
            ..
        } = *self;
        if *store.fail_commit.lock().unwrap() {
            return Err(StorageError::backend("commit failed"));
        }
        let mut state = store.state.lock().unwrap();
        for account in &accounts {
            let duplicate = state.accounts.values().any(|existing| {
                existing.username == account.username
                    || (existing.external_id.is_some()
                        && existing.external_id == account.external_id
                        && existing.external_provider_name == account.external_provider_name)
            });
            if duplicate {
                return Err(StorageError::conflict(format!(
                    "account {} already exists",
                    account.username
                )));
            }
        }
        for account in accounts.into_iter().chain(links) {
            state.accounts.insert(account.id, account);
        }
        for profile in profiles {
            state.profiles.insert(profile.account_id, profile);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Role provider with a fixed set of role names.
pub struct FixedRoles {
    name: String,
    roles: Vec<Role>,
}

impl FixedRoles {
    pub fn new(name: &str, roles: &[&str]) -> Arc<dyn RoleProvider> {
        Arc::new(Self {
            name: name.to_string(),
            roles: roles.iter().map(|r| Role::new(*r)).collect(),
        })
    }
}

#[async_trait]
impl RoleProvider for FixedRoles {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StorageError> {
        Ok(self.roles.iter().find(|r| r.name == name).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StorageError> {
        Ok(self.roles.clone())
    }
}

/// Session store backed by a [`FakeAccounts`].
#[derive(Clone)]
pub struct FakeSessions {
    accounts: FakeAccounts,
    sessions: Arc<Mutex<HashMap<String, LoginSession>>>,
}

impl FakeSessions {
    pub fn new(accounts: FakeAccounts) -> Self {
        Self {
            accounts,
            sessions: Arc::default(),
        }
    }
}

#[async_trait]
impl SessionStore for FakeSessions {
    async fn authenticate_by_username(
        &self,
        username: &str,
        persist_cookie: bool,
    ) -> Result<AuthenticationOutcome, StorageError> {
        let Some(account) = self.accounts.find_by_username(username).await? else {
            return Ok(AuthenticationOutcome::Failure(
                LoginFailureReason::UserNotFound,
            ));
        };
        if !account.is_active() {
            return Ok(AuthenticationOutcome::Failure(
                LoginFailureReason::UserInactive,
            ));
        }
        let session = LoginSession::new(account.id, account.username, persist_cookie);
        self.sessions
            .lock()
            .unwrap()
            .insert(session.session_id.clone(), session.clone());
        Ok(AuthenticationOutcome::Success(session))
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<LoginSession>, StorageError> {
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }
}

/// Sign-in subsystem that records what it was handed.
#[derive(Clone, Default)]
pub struct RecordingSignIn {
    pub calls: Arc<Mutex<Vec<(ClaimsIdentity, AuthenticationProperties)>>>,
    pub refuse_with: Option<LoginFailureReason>,
}

#[async_trait]
impl SignInSubsystem for RecordingSignIn {
    async fn sign_in(
        &self,
        identity: ClaimsIdentity,
        properties: AuthenticationProperties,
    ) -> Result<AuthenticationOutcome, StorageError> {
        let subject = identity.subject().unwrap_or_default().to_string();
        let redirect = properties.redirect_uri.clone();
        self.calls.lock().unwrap().push((identity, properties));
        if let Some(reason) = self.refuse_with {
            return Ok(AuthenticationOutcome::Failure(reason));
        }
        Ok(AuthenticationOutcome::Success(
            LoginSession::new(Uuid::new_v4(), subject, false).with_return_url(redirect),
        ))
    }
}
