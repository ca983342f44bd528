//! External identity provider login.
//!
//! This module provides the redirect/callback login flow:
//!
//! - Identity resolution of provider callbacks (signed assertions)
//! - Single-use login state bound to the browser
//! - Return URL normalization
//! - Account mapping (custom account creation or delegated claims sign-in)
//! - Login orchestration

pub mod claims;
pub mod custom;
pub mod delegated;
pub mod error;
pub mod identity;
pub mod mapper;
pub mod orchestrator;
pub mod resolver;
pub mod return_url;
pub mod signed;
pub mod state;

pub use claims::{AuthenticationProperties, Claim, ClaimsIdentity};
pub use custom::CustomMapper;
pub use delegated::DelegatedMapper;
pub use error::{MappingError, ResolutionError};
pub use identity::ExternalIdentity;
pub use mapper::{AccountMapper, MapperCollaborators};
pub use orchestrator::{
    CALLBACK_PATH, LOGIN_PATH, LoginOrchestrator, LoginPhase, RedirectInstruction,
};
pub use resolver::{CallbackParams, IdentityResolver};
pub use return_url::{ReturnUrlGuard, append_error};
pub use signed::SignedCallbackResolver;
pub use state::{LoginStates, STATE_PARAM};
