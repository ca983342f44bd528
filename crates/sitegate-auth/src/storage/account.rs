//! Local account storage trait.
//!
//! Defines the local account record that external identities are mapped to,
//! its profile, and the transactional interface used to create both.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::StorageError;
use crate::privilege::ElevatedScope;

// =============================================================================
// Role Reference
// =============================================================================

/// A reference to a role held by one of the role providers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleRef {
    /// Name of the role provider that owns the role.
    pub provider: String,

    /// Role identifier inside the provider.
    pub role_id: Uuid,

    /// Role name (e.g., "Administrators").
    pub name: String,
}

impl RoleRef {
    /// Creates a new role reference.
    #[must_use]
    pub fn new(provider: impl Into<String>, role_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            role_id,
            name: name.into(),
        }
    }
}

// =============================================================================
// Local Account
// =============================================================================

/// A local, session-capable account.
///
/// Accounts mapped from an external identity use the external identifier as
/// their username; the username is only used to sign the user in
/// programmatically after the provider has authenticated them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccount {
    /// Unique identifier for the account.
    pub id: Uuid,

    /// Username used by the session store.
    pub username: String,

    /// Email address (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the account may use the administration backend.
    pub is_backend_user: bool,

    /// Subject identifier from the external provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    /// Name of the external provider the account is linked to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_provider_name: Option<String>,

    /// Roles assigned to the account.
    #[serde(default)]
    pub roles: BTreeSet<RoleRef>,

    /// Inactive accounts cannot sign in.
    pub active: bool,

    /// When the account was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the account was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl LocalAccount {
    /// Creates a new active account with the given username.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: None,
            is_backend_user: false,
            external_id: None,
            external_provider_name: None,
            roles: BTreeSet::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a new account builder.
    #[must_use]
    pub fn builder(username: impl Into<String>) -> LocalAccountBuilder {
        LocalAccountBuilder::new(username)
    }

    /// Returns `true` if the account is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns `true` if the account holds a role with the given name.
    #[must_use]
    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.name == name)
    }

    /// Returns `true` if the account is linked to the given external identity.
    #[must_use]
    pub fn is_linked_to(&self, external_id: &str, provider_name: &str) -> bool {
        self.external_id.as_deref() == Some(external_id)
            && self.external_provider_name.as_deref() == Some(provider_name)
    }
}

// =============================================================================
// Local Account Builder
// =============================================================================

/// Builder for creating `LocalAccount` instances.
pub struct LocalAccountBuilder {
    account: LocalAccount,
}

impl LocalAccountBuilder {
    fn new(username: impl Into<String>) -> Self {
        Self {
            account: LocalAccount::new(username),
        }
    }

    /// Sets the account ID.
    #[must_use]
    pub fn id(mut self, id: Uuid) -> Self {
        self.account.id = id;
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.account.email = Some(email.into());
        self
    }

    /// Links the account to an external identity.
    #[must_use]
    pub fn external_identity(
        mut self,
        external_id: impl Into<String>,
        provider_name: impl Into<String>,
    ) -> Self {
        self.account.external_id = Some(external_id.into());
        self.account.external_provider_name = Some(provider_name.into());
        self
    }

    /// Sets whether the account is a backend user.
    #[must_use]
    pub fn backend_user(mut self, is_backend_user: bool) -> Self {
        self.account.is_backend_user = is_backend_user;
        self
    }

    /// Adds a role to the account.
    #[must_use]
    pub fn add_role(mut self, role: RoleRef) -> Self {
        self.account.roles.insert(role);
        self
    }

    /// Sets whether the account is active.
    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.account.active = active;
        self
    }

    /// Builds the account.
    #[must_use]
    pub fn build(self) -> LocalAccount {
        self.account
    }
}

// =============================================================================
// Profile
// =============================================================================

/// Prefix of derived profile URLs.
pub const PROFILE_URL_PREFIX: &str = "/users/";

/// User profile attached to a local account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// The account this profile belongs to.
    pub account_id: Uuid,

    /// First name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// Last name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Display nickname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    /// Derived profile URL; recomputed before the owning transaction commits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Profile {
    /// Creates an empty profile for the given account.
    #[must_use]
    pub fn new(account_id: Uuid) -> Self {
        Self {
            account_id,
            ..Self::default()
        }
    }

    /// Sets the first name.
    #[must_use]
    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    /// Sets the last name.
    #[must_use]
    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    /// Sets the nickname.
    #[must_use]
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// Recomputes the derived URL from the nickname, falling back to the
    /// account's username.
    pub fn recompute_url(&mut self, account: &LocalAccount) {
        let source = self.nickname.as_deref().unwrap_or(&account.username);
        self.url = Some(format!("{PROFILE_URL_PREFIX}{}", slugify(source)));
    }
}

/// Lowercases and replaces every run of non-alphanumeric characters with `-`.
fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for c in value.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

// =============================================================================
// Account Storage Traits
// =============================================================================

/// Storage operations for local accounts.
///
/// Reads are open to the anonymous caller. Writes only happen through an
/// [`AccountTransaction`], which can only be started with an
/// [`ElevatedScope`].
///
/// Implementations must enforce uniqueness of the username and of the
/// `(external_id, external_provider_name)` pair at commit time; the lookup
/// performed by the mappers before creating an account is an optimization,
/// not the guard.
#[async_trait]
pub trait AccountStorage: Send + Sync {
    /// Find an account by its unique ID.
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<LocalAccount>, StorageError>;

    /// Find an account by username.
    async fn find_by_username(&self, username: &str)
    -> Result<Option<LocalAccount>, StorageError>;

    /// Find an account by email address.
    async fn find_by_email(&self, email: &str) -> Result<Option<LocalAccount>, StorageError>;

    /// Find the account linked to an external identity.
    ///
    /// # Arguments
    ///
    /// * `external_id` - The subject identifier from the provider
    /// * `provider_name` - The external provider name stored on the account
    async fn find_by_external_identity(
        &self,
        external_id: &str,
        provider_name: &str,
    ) -> Result<Option<LocalAccount>, StorageError>;

    /// Find the profile of an account.
    async fn find_profile(&self, account_id: Uuid) -> Result<Option<Profile>, StorageError>;

    /// Count stored accounts.
    async fn count(&self) -> Result<usize, StorageError>;

    /// Begin an account creation transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PrivilegeRequired`] if the scope has already
    /// been released.
    async fn begin(
        &self,
        scope: &ElevatedScope,
    ) -> Result<Box<dyn AccountTransaction>, StorageError>;
}

/// An all-or-nothing unit of account writes.
///
/// Nothing becomes visible to readers before [`commit`](Self::commit).
/// Dropping a transaction without committing discards every staged write.
#[async_trait]
pub trait AccountTransaction: Send {
    /// Transaction identifier, for logging.
    fn id(&self) -> &str;

    /// Stage a new account.
    async fn create_account(&mut self, account: LocalAccount) -> Result<(), StorageError>;

    /// Stage a role assignment for an account staged in this transaction.
    async fn assign_role(&mut self, account_id: Uuid, role: RoleRef) -> Result<(), StorageError>;

    /// Stage linking an existing account to an external identity.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the account does not exist.
    async fn link_external_identity(
        &mut self,
        account_id: Uuid,
        external_id: &str,
        provider_name: &str,
    ) -> Result<(), StorageError>;

    /// Stage a profile for an account staged in this transaction.
    async fn create_profile(&mut self, profile: Profile) -> Result<(), StorageError>;

    /// Recompute derived profile data (the profile URL).
    async fn recompute_profile(&mut self, account_id: Uuid) -> Result<(), StorageError>;

    /// Apply every staged write atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if a uniqueness constraint would be
    /// violated; nothing is written in that case.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Discard every staged write.
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

// =============================================================================
// Tests
// =============================================================================
