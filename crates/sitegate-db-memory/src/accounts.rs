//! In-memory account storage.
//!
//! Accounts, profiles and the uniqueness indexes live behind a single
//! `tokio::sync::RwLock`. Transactions stage their writes privately and apply
//! them under one write lock at commit, after checking the username and
//! external identity indexes, so concurrent first logins for the same
//! identity leave exactly one account.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sitegate_auth::privilege::ElevatedScope;
use sitegate_auth::storage::{
    AccountStorage, AccountTransaction, LocalAccount, Profile, RoleRef, StorageError,
};
use tokio::sync::RwLock;
use uuid::Uuid;

type ExternalKey = (String, String);

#[derive(Debug, Default)]
struct AccountState {
    accounts: HashMap<Uuid, LocalAccount>,
    profiles: HashMap<Uuid, Profile>,
    by_username: HashMap<String, Uuid>,
    by_external: HashMap<ExternalKey, Uuid>,
}

impl AccountState {
    fn external_key(account: &LocalAccount) -> Option<ExternalKey> {
        match (&account.external_id, &account.external_provider_name) {
            (Some(id), Some(provider)) => Some((id.clone(), provider.clone())),
            _ => None,
        }
    }

    /// Checks that `account` can be stored without violating uniqueness.
    fn check_unique(&self, account: &LocalAccount) -> Result<(), StorageError> {
        if let Some(owner) = self.by_username.get(&account.username)
            && *owner != account.id
        {
            return Err(StorageError::conflict(format!(
                "username '{}' is already taken",
                account.username
            )));
        }
        if let Some(key) = Self::external_key(account)
            && let Some(owner) = self.by_external.get(&key)
            && *owner != account.id
        {
            return Err(StorageError::conflict(format!(
                "external identity '{}' of '{}' is already linked",
                key.0, key.1
            )));
        }
        Ok(())
    }

    fn put(&mut self, account: LocalAccount) {
        if let Some(previous) = self.accounts.get(&account.id) {
            if let Some(key) = Self::external_key(previous) {
                self.by_external.remove(&key);
            }
            self.by_username.remove(&previous.username);
        }
        self.by_username.insert(account.username.clone(), account.id);
        if let Some(key) = Self::external_key(&account) {
            self.by_external.insert(key, account.id);
        }
        self.accounts.insert(account.id, account);
    }
}

/// In-memory implementation of [`AccountStorage`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountStorage {
    state: Arc<RwLock<AccountState>>,
    tx_counter: Arc<AtomicU64>,
}

impl InMemoryAccountStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores accounts directly, bypassing the elevated transaction path.
    ///
    /// Used to load configured accounts at startup.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] on the first account that clashes
    /// with a stored one; earlier accounts stay stored.
    pub async fn seed(
        &self,
        accounts: impl IntoIterator<Item = LocalAccount>,
    ) -> Result<usize, StorageError> {
        let mut state = self.state.write().await;
        let mut seeded = 0;
        for account in accounts {
            state.check_unique(&account)?;
            state.put(account);
            seeded += 1;
        }
        Ok(seeded)
    }
}

#[async_trait]
impl AccountStorage for InMemoryAccountStorage {
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<LocalAccount>, StorageError> {
        Ok(self.state.read().await.accounts.get(&account_id).cloned())
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<LocalAccount>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .by_username
            .get(username)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<LocalAccount>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .values()
            .find(|a| a.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            .cloned())
    }

    async fn find_by_external_identity(
        &self,
        external_id: &str,
        provider_name: &str,
    ) -> Result<Option<LocalAccount>, StorageError> {
        let state = self.state.read().await;
        let key = (external_id.to_string(), provider_name.to_string());
        Ok(state
            .by_external
            .get(&key)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn find_profile(&self, account_id: Uuid) -> Result<Option<Profile>, StorageError> {
        Ok(self.state.read().await.profiles.get(&account_id).cloned())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.state.read().await.accounts.len())
    }

    async fn begin(
        &self,
        scope: &ElevatedScope,
    ) -> Result<Box<dyn AccountTransaction>, StorageError> {
        let id = format!("tx-{}", self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1);
        tracing::debug!(tx_id = %id, scope_id = %scope.id(), purpose = scope.purpose(), "Transaction started");
        Ok(Box::new(InMemoryAccountTransaction {
            id,
            state: Arc::clone(&self.state),
            staged: Vec::new(),
            profiles: Vec::new(),
            finished: false,
        }))
    }
}

/// A staged set of account writes.
///
/// Dropping the transaction without committing discards the staged writes.
pub struct InMemoryAccountTransaction {
    id: String,
    state: Arc<RwLock<AccountState>>,
    staged: Vec<LocalAccount>,
    profiles: Vec<Profile>,
    finished: bool,
}

impl InMemoryAccountTransaction {
    fn staged_mut(&mut self, account_id: Uuid) -> Option<&mut LocalAccount> {
        self.staged.iter_mut().find(|a| a.id == account_id)
    }

    fn has_writes(&self) -> bool {
        !self.staged.is_empty() || !self.profiles.is_empty()
    }
}

#[async_trait]
impl AccountTransaction for InMemoryAccountTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    async fn create_account(&mut self, account: LocalAccount) -> Result<(), StorageError> {
        if self.staged.iter().any(|a| a.id == account.id || a.username == account.username) {
            return Err(StorageError::conflict(format!(
                "account '{}' is already staged",
                account.username
            )));
        }
        self.staged.push(account);
        Ok(())
    }

    async fn assign_role(&mut self, account_id: Uuid, role: RoleRef) -> Result<(), StorageError> {
        let account = self
            .staged_mut(account_id)
            .ok_or_else(|| StorageError::not_found(format!("account {account_id} is not staged")))?;
        account.roles.insert(role);
        Ok(())
    }

    async fn link_external_identity(
        &mut self,
        account_id: Uuid,
        external_id: &str,
        provider_name: &str,
    ) -> Result<(), StorageError> {
        if self.staged_mut(account_id).is_none() {
            let existing = self
                .state
                .read()
                .await
                .accounts
                .get(&account_id)
                .cloned()
                .ok_or_else(|| StorageError::not_found(format!("account {account_id}")))?;
            self.staged.push(existing);
        }
        let account = self
            .staged_mut(account_id)
            .ok_or_else(|| StorageError::not_found(format!("account {account_id}")))?;
        account.external_id = Some(external_id.to_string());
        account.external_provider_name = Some(provider_name.to_string());
        Ok(())
    }

    async fn create_profile(&mut self, profile: Profile) -> Result<(), StorageError> {
        if self.staged_mut(profile.account_id).is_none() {
            return Err(StorageError::not_found(format!(
                "account {} is not staged",
                profile.account_id
            )));
        }
        self.profiles.retain(|p| p.account_id != profile.account_id);
        self.profiles.push(profile);
        Ok(())
    }

    async fn recompute_profile(&mut self, account_id: Uuid) -> Result<(), StorageError> {
        let account = self
            .staged
            .iter()
            .find(|a| a.id == account_id)
            .ok_or_else(|| StorageError::not_found(format!("account {account_id} is not staged")))?;
        let profile = self
            .profiles
            .iter_mut()
            .find(|p| p.account_id == account_id)
            .ok_or_else(|| StorageError::not_found(format!("profile of {account_id}")))?;
        profile.recompute_url(account);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        self.finished = true;
        let staged = std::mem::take(&mut self.staged);
        let profiles = std::mem::take(&mut self.profiles);

        let mut state = self.state.write().await;
        for (i, account) in staged.iter().enumerate() {
            state.check_unique(account)?;
            let clash = staged[..i].iter().any(|other| {
                other.username == account.username
                    || (AccountState::external_key(other).is_some()
                        && AccountState::external_key(other) == AccountState::external_key(account))
            });
            if clash {
                return Err(StorageError::conflict(format!(
                    "account '{}' staged twice",
                    account.username
                )));
            }
        }

        let count = staged.len();
        for account in staged {
            state.put(account);
        }
        for profile in profiles {
            state.profiles.insert(profile.account_id, profile);
        }
        tracing::debug!(tx_id = %self.id, accounts = count, "Transaction committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        self.finished = true;
        tracing::debug!(tx_id = %self.id, "Transaction rolled back");
        Ok(())
    }
}

impl Drop for InMemoryAccountTransaction {
    fn drop(&mut self) {
        if !self.finished && self.has_writes() {
            tracing::debug!(tx_id = %self.id, "Uncommitted transaction dropped, writes discarded");
        }
    }
}
