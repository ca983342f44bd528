//! HTTP handlers for the login endpoints.
//!
//! This module provides Axum handlers and the state they need.
//!
//! # Available Handlers
//!
//! - [`external`] - External identity provider login and callback
//! - [`local`] - Password-less local login widget

pub mod cookies;
pub mod csrf;
pub mod external;
pub mod local;
pub mod templates;

pub use cookies::{csrf_cookie, login_state_cookie, login_state_removal, session_cookie};
pub use csrf::{CsrfValidator, DoubleSubmitCsrf};
pub use external::{
    ExternalAuthState, LoginQuery, external_callback_handler, external_login_handler,
    redirect_response,
};
pub use local::{
    LOCAL_AUTH_PATH, LocalAuthState, LocalLoginForm, local_login_form_handler,
    local_login_submit_handler,
};
