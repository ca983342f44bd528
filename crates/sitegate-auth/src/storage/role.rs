//! Role providers and the ordered role directory.
//!
//! Roles are owned by one or more role providers. When an account is created
//! its configured initial roles are resolved by name through the
//! [`RoleDirectory`], which asks the providers in their configured order and
//! stops at the first provider that knows the role.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{RoleRef, StorageError};

/// A role held by a role provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique identifier for the role.
    pub id: Uuid,

    /// Role name (e.g., "Administrators", "BackendUsers").
    pub name: String,

    /// Human-readable description of the role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Role {
    /// Creates a new role with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A named source of roles.
#[async_trait]
pub trait RoleProvider: Send + Sync {
    /// The provider name recorded in [`RoleRef::provider`].
    fn name(&self) -> &str;

    /// Find a role by its exact name.
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StorageError>;

    /// List all roles of this provider.
    async fn list_roles(&self) -> Result<Vec<Role>, StorageError>;
}

/// Ordered collection of role providers.
///
/// The order in which providers are added is the tie-break: when two
/// providers define a role with the same name, the provider added first wins.
#[derive(Clone, Default)]
pub struct RoleDirectory {
    providers: Vec<Arc<dyn RoleProvider>>,
}

impl RoleDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a provider with the lowest precedence so far.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn RoleProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Lists the providers in precedence order.
    #[must_use]
    pub fn list_role_providers(&self) -> &[Arc<dyn RoleProvider>] {
        &self.providers
    }

    /// Resolves a role name to a reference.
    ///
    /// Returns `None` if no provider knows the role.
    pub async fn resolve(&self, name: &str) -> Result<Option<RoleRef>, StorageError> {
        for provider in &self.providers {
            if let Some(role) = provider.find_role_by_name(name).await? {
                tracing::debug!(role = %name, provider = %provider.name(), "Resolved role");
                return Ok(Some(RoleRef::new(provider.name(), role.id, role.name)));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for RoleDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleDirectory")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
