//! In-memory stores for SiteGate.
//!
//! This crate provides in-memory implementations of the storage traits from
//! `sitegate-auth`:
//!
//! - [`InMemoryAccountStorage`] - accounts and profiles with transactional,
//!   uniqueness-checked commits
//! - [`InMemoryRoleProvider`] - a named role source backed by a papaya map
//! - [`InMemorySessionStore`] - password-less session issuance
//! - [`ClaimsSignIn`] - claims-based sign-in with auto-provisioning
//!
//! # Example
//!
//! ```ignore
//! use sitegate_db_memory::{InMemoryAccountStorage, InMemorySessionStore};
//! use sitegate_auth::storage::{LocalAccount, SessionStore};
//!
//! let accounts = InMemoryAccountStorage::new();
//! accounts.seed([LocalAccount::new("editor")]).await?;
//!
//! let sessions = InMemorySessionStore::new(accounts.clone());
//! let outcome = sessions.authenticate_by_username("editor", false).await?;
//! ```

pub mod accounts;
pub mod roles;
pub mod sessions;
pub mod sign_in;

pub use accounts::{InMemoryAccountStorage, InMemoryAccountTransaction};
pub use roles::InMemoryRoleProvider;
pub use sessions::InMemorySessionStore;
pub use sign_in::{ClaimsSignIn, ProvisioningAction};
