//! Storage traits for the login flow.
//!
//! This module defines the interfaces of the host platform's stores:
//!
//! - Local accounts, profiles and the account creation transaction
//! - Role providers and the ordered role directory
//! - Session issuance (authenticate-by-username) and claims sign-in
//!
//! # Implementations
//!
//! - `sitegate-db-memory` - in-memory stores with transactional commit

pub mod account;
pub mod error;
pub mod role;
pub mod session;

pub use account::{
    AccountStorage, AccountTransaction, LocalAccount, LocalAccountBuilder, Profile, RoleRef,
};
pub use error::StorageError;
pub use role::{Role, RoleDirectory, RoleProvider};
pub use session::{
    AuthenticationOutcome, LoginFailureReason, LoginSession, SessionStore, SignInSubsystem,
};
