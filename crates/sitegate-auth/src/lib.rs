//! External identity login for SiteGate.
//!
//! This crate provides:
//!
//! - The redirect/callback login flow against an external identity provider
//! - Mapping of external identities to local accounts (custom or delegated)
//! - Elevated privilege scopes for account creation
//! - Storage traits for accounts, roles and sessions
//! - Axum handlers for the login endpoints and the local login widget
//!
//! # Modules
//!
//! - [`config`] - Login configuration types
//! - [`error`] - Error types for the login flow
//! - [`federation`] - Identity resolution, account mapping, orchestration
//! - [`http`] - HTTP handlers
//! - [`privilege`] - Elevated privilege scopes
//! - [`storage`] - Storage traits for the host platform's stores

pub mod config;
pub mod error;
pub mod federation;
pub mod http;
pub mod privilege;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{
    AuthConfig, ConfigError, CustomMappingConfig, DelegatedMappingConfig, ExternalAuthConfig,
    MappingConfig, MissingRolePolicy, ProvisioningConfig, ReturnUrlPolicy, SessionConfig,
};
pub use error::{AuthError, ErrorCategory};
pub use federation::{
    AccountMapper, AuthenticationProperties, CALLBACK_PATH, Claim, ClaimsIdentity, CustomMapper,
    DelegatedMapper, ExternalIdentity, IdentityResolver, LOGIN_PATH, LoginOrchestrator,
    LoginPhase, MapperCollaborators, MappingError, RedirectInstruction, ResolutionError,
    SignedCallbackResolver,
};
pub use http::{
    CsrfValidator, DoubleSubmitCsrf, ExternalAuthState, LOCAL_AUTH_PATH, LocalAuthState,
    external_callback_handler, external_login_handler, local_login_form_handler,
    local_login_submit_handler,
};
pub use privilege::{ElevatedScope, PrivilegeGate};
pub use storage::{
    AccountStorage, AccountTransaction, AuthenticationOutcome, LocalAccount, LoginFailureReason,
    LoginSession, Profile, Role, RoleDirectory, RoleProvider, RoleRef, SessionStore,
    SignInSubsystem, StorageError,
};

/// Type alias for login flow results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sitegate_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError, MappingConfig};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::federation::{
        AccountMapper, CallbackParams, ExternalIdentity, IdentityResolver, LoginOrchestrator,
        MapperCollaborators, SignedCallbackResolver,
    };
    pub use crate::privilege::{ElevatedScope, PrivilegeGate};
    pub use crate::storage::{
        AccountStorage, AccountTransaction, AuthenticationOutcome, LocalAccount,
        LoginFailureReason, LoginSession, Profile, Role, RoleDirectory, RoleProvider, RoleRef,
        SessionStore, SignInSubsystem, StorageError,
    };
}
