//! In-memory role provider.

use std::sync::Arc;

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use sitegate_auth::storage::{Role, RoleProvider, StorageError};

/// Role provider keeping its roles in a papaya map keyed by name.
#[derive(Debug, Clone)]
pub struct InMemoryRoleProvider {
    name: String,
    roles: Arc<PapayaHashMap<String, Role>>,
}

impl InMemoryRoleProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Arc::new(PapayaHashMap::new()),
        }
    }

    /// Creates a provider holding a role for each name.
    #[must_use]
    pub fn with_roles<I, S>(name: impl Into<String>, role_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new(name);
        for role_name in role_names {
            provider.add_role(Role::new(role_name));
        }
        provider
    }

    /// Adds or replaces a role.
    pub fn add_role(&self, role: Role) {
        self.roles.pin().insert(role.name.clone(), role);
    }

    /// Removes a role by name, returning `true` if it existed.
    pub fn remove_role(&self, name: &str) -> bool {
        self.roles.pin().remove(name).is_some()
    }
}

#[async_trait]
impl RoleProvider for InMemoryRoleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StorageError> {
        Ok(self.roles.pin().get(name).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StorageError> {
        let mut roles: Vec<Role> = self.roles.pin().values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }
}
