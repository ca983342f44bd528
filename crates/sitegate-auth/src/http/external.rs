//! External login endpoints.
//!
//! - `GET /external.auth/login?returnUrl=...` redirects to the provider
//! - `GET /external.auth/callback?returnUrl=...&state=...&<provider params>`
//!   completes the login and redirects to the return URL
//!
//! The login endpoint sets the login state cookie; the callback endpoint
//! checks it against the callback and always clears it.
//!
//! # Usage
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use sitegate_auth::http::{external_callback_handler, external_login_handler};
//!
//! let app = Router::new()
//!     .route("/external.auth/login", get(external_login_handler))
//!     .route("/external.auth/callback", get(external_callback_handler))
//!     .with_state(external_state);
//! ```

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::cookies::{login_state_cookie, login_state_removal, session_cookie};
use crate::config::SessionConfig;
use crate::federation::{CallbackParams, LoginOrchestrator, RedirectInstruction};

/// State required by the external login endpoints.
#[derive(Clone)]
pub struct ExternalAuthState {
    /// The login flow.
    pub orchestrator: Arc<LoginOrchestrator>,
    /// Session cookie settings.
    pub session_config: SessionConfig,
}

/// Query of the login endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// Where to go after signing in.
    #[serde(rename = "returnUrl")]
    pub return_url: Option<String>,
}

/// GET /external.auth/login handler.
pub async fn external_login_handler(
    State(state): State<ExternalAuthState>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Response {
    match state.orchestrator.begin_login(query.return_url.as_deref()) {
        Ok(redirect) => match redirect.state {
            Some(ref login_state) => {
                let lifetime = state.orchestrator.login_states().lifetime();
                let jar = jar.add(login_state_cookie(
                    &state.session_config,
                    login_state,
                    lifetime,
                ));
                found(&redirect.location, Some(jar))
            }
            None => found(&redirect.location, None),
        },
        Err(e) => {
            tracing::error!(error = %e, category = %e.category(), "Cannot start external login");
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, "External login is unavailable").into_response()
        }
    }
}

/// GET /external.auth/callback handler.
pub async fn external_callback_handler(
    State(state): State<ExternalAuthState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let browser_state = jar
        .get(&state.session_config.state_cookie_name)
        .map(|c| c.value().to_string());
    let redirect = state
        .orchestrator
        .handle_callback(&params, browser_state.as_deref())
        .await;
    let jar = if browser_state.is_some() {
        jar.remove(login_state_removal(&state.session_config))
    } else {
        jar
    };
    redirect_response(&state.session_config, jar, redirect)
}

/// Turns a redirect instruction into a 302 response, attaching the session
/// cookie on success.
pub fn redirect_response(
    config: &SessionConfig,
    jar: CookieJar,
    redirect: RedirectInstruction,
) -> Response {
    let jar = match redirect.session {
        Some(ref session) => jar.add(session_cookie(config, session)),
        None => jar,
    };
    found(&redirect.location, Some(jar))
}

/// 302 Found with the given `Location`.
pub(crate) fn found(location: &str, jar: Option<CookieJar>) -> Response {
    let status = StatusCode::from_u16(RedirectInstruction::STATUS).unwrap_or(StatusCode::FOUND);
    match jar {
        Some(jar) => (status, jar, [(LOCATION, location.to_string())]).into_response(),
        None => (status, [(LOCATION, location.to_string())]).into_response(),
    }
}
