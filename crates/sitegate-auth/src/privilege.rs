//! Elevated privilege scope.
//!
//! Anonymous callers cannot create accounts. The account mapper acquires an
//! [`ElevatedScope`] from the [`PrivilegeGate`] for the duration of the
//! account creation transaction; [`AccountStorage::begin`] refuses to start a
//! transaction without one. The scope is released when the guard is dropped,
//! so every exit path (commit, validation failure, store failure, panic
//! unwinding) releases it.
//!
//! [`AccountStorage::begin`]: crate::storage::AccountStorage::begin

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use uuid::Uuid;

/// Issues elevated scopes and tracks how many are held.
#[derive(Debug, Clone, Default)]
pub struct PrivilegeGate {
    active: Arc<AtomicUsize>,
}

impl PrivilegeGate {
    /// Creates a gate with no active scopes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires an elevated scope for `purpose`.
    #[must_use = "the scope is released as soon as it is dropped"]
    pub fn elevate(&self, purpose: &'static str) -> ElevatedScope {
        self.active.fetch_add(1, Ordering::SeqCst);
        let scope = ElevatedScope {
            id: Uuid::new_v4(),
            purpose,
            active: Arc::clone(&self.active),
        };
        tracing::debug!(scope_id = %scope.id, purpose, "Elevated scope acquired");
        scope
    }

    /// Number of scopes currently held.
    #[must_use]
    pub fn active_scopes(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns `true` if any scope is currently held.
    #[must_use]
    pub fn is_elevated(&self) -> bool {
        self.active_scopes() > 0
    }
}

/// Capability token proving the holder runs with elevated privilege.
///
/// Can only be obtained from [`PrivilegeGate::elevate`]; not `Clone`.
#[derive(Debug)]
pub struct ElevatedScope {
    id: Uuid,
    purpose: &'static str,
    active: Arc<AtomicUsize>,
}

impl ElevatedScope {
    /// Scope identifier, for logging.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// What the scope was acquired for.
    #[must_use]
    pub fn purpose(&self) -> &'static str {
        self.purpose
    }
}

impl Drop for ElevatedScope {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(scope_id = %self.id, purpose = self.purpose, "Elevated scope released");
    }
}
