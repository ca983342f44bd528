//! Password-less local login widget.
//!
//! - `GET /samples/local-auth` renders the form and sets the CSRF cookie
//! - `POST /samples/local-auth` signs the named user in without a password
//!
//! A submission with an invalid CSRF token gets an empty `200 OK`. A refused
//! sign-in re-renders the form with an error; a successful one redirects
//! back to the widget with the session cookie set.

use std::sync::Arc;

use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::cookies::{csrf_cookie, session_cookie};
use super::csrf::CsrfValidator;
use super::external::found;
use super::templates::{LOGIN_ERROR_TEXT, render_local_login_form};
use crate::config::SessionConfig;
use crate::storage::{AuthenticationOutcome, SessionStore};

/// Path of the local login widget.
pub const LOCAL_AUTH_PATH: &str = "/samples/local-auth";

/// State required by the local login widget.
#[derive(Clone)]
pub struct LocalAuthState {
    /// Password-less session issuance.
    pub sessions: Arc<dyn SessionStore>,
    /// Anti-forgery token validation.
    pub csrf: Arc<dyn CsrfValidator>,
    /// Cookie settings.
    pub session_config: SessionConfig,
}

/// Form fields of the local login widget.
#[derive(Debug, Default, Deserialize)]
pub struct LocalLoginForm {
    /// Username to sign in.
    #[serde(default)]
    pub username: String,

    /// Checkbox value; any value other than "false" means checked.
    #[serde(default)]
    pub remember_me: Option<String>,

    /// Anti-forgery token.
    #[serde(default)]
    pub csrf_token: Option<String>,
}

impl LocalLoginForm {
    /// Returns `true` if "remember me" was checked.
    #[must_use]
    pub fn remember_me(&self) -> bool {
        self.remember_me
            .as_deref()
            .is_some_and(|v| !v.is_empty() && !v.eq_ignore_ascii_case("false"))
    }
}

/// GET /samples/local-auth handler.
pub async fn local_login_form_handler(
    State(state): State<LocalAuthState>,
    jar: CookieJar,
) -> Response {
    let token = state.csrf.issue();
    let jar = jar.add(csrf_cookie(&state.session_config, &token));
    (jar, Html(render_local_login_form(LOCAL_AUTH_PATH, &token, None))).into_response()
}

/// POST /samples/local-auth handler.
pub async fn local_login_submit_handler(
    State(state): State<LocalAuthState>,
    jar: CookieJar,
    Form(form): Form<LocalLoginForm>,
) -> Response {
    let cookie_token = jar
        .get(&state.session_config.csrf_cookie_name)
        .map(|c| c.value().to_string());

    if !state
        .csrf
        .validate(form.csrf_token.as_deref(), cookie_token.as_deref())
    {
        tracing::warn!("Local login rejected: invalid CSRF token");
        return (StatusCode::OK, "").into_response();
    }
    let csrf_token = cookie_token.unwrap_or_default();

    let username = form.username.trim();
    let remember_me = form.remember_me();
    match state
        .sessions
        .authenticate_by_username(username, remember_me)
        .await
    {
        Ok(AuthenticationOutcome::Success(session)) => {
            tracing::info!(
                account_id = %session.account_id,
                username = %session.username,
                persist_cookie = session.persist_cookie,
                "Local user signed in"
            );
            let jar = jar.add(session_cookie(&state.session_config, &session));
            found(LOCAL_AUTH_PATH, Some(jar))
        }
        Ok(AuthenticationOutcome::Failure(reason)) => {
            tracing::info!(username = %username, reason = %reason, "Local login refused");
            Html(render_local_login_form(
                LOCAL_AUTH_PATH,
                &csrf_token,
                Some(LOGIN_ERROR_TEXT),
            ))
            .into_response()
        }
        Err(e) => {
            tracing::error!(username = %username, error = %e, "Local login failed");
            Html(render_local_login_form(
                LOCAL_AUTH_PATH,
                &csrf_token,
                Some(LOGIN_ERROR_TEXT),
            ))
            .into_response()
        }
    }
}
