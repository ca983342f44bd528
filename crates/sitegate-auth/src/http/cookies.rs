//! Session, login state and CSRF cookie construction.

use cookie::{Cookie, SameSite};
use time::Duration;

use crate::config::SessionConfig;
use crate::storage::LoginSession;

/// Builds the session cookie for an issued session.
///
/// Persistent sessions carry a `Max-Age`; other sessions end with the
/// browser session.
#[must_use]
pub fn session_cookie(config: &SessionConfig, session: &LoginSession) -> Cookie<'static> {
    let mut cookie = Cookie::build((config.cookie_name.clone(), session.session_id.clone()))
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/");
    if session.persist_cookie {
        let max_age = Duration::try_from(config.persistent_lifetime).unwrap_or(Duration::MAX);
        cookie = cookie.max_age(max_age);
    }
    cookie.build()
}

/// Builds the cookie binding an external login to the browser.
///
/// `SameSite=Lax`, since the browser returns from the provider with a
/// cross-site top-level navigation.
#[must_use]
pub fn login_state_cookie(
    config: &SessionConfig,
    state: &str,
    lifetime: std::time::Duration,
) -> Cookie<'static> {
    let max_age = Duration::try_from(lifetime).unwrap_or(Duration::MAX);
    Cookie::build((config.state_cookie_name.clone(), state.to_string()))
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

/// Cookie used to remove the login state cookie once a callback arrived.
#[must_use]
pub fn login_state_removal(config: &SessionConfig) -> Cookie<'static> {
    Cookie::build(config.state_cookie_name.clone())
        .path("/")
        .build()
}

/// Builds the CSRF cookie of the local login widget.
#[must_use]
pub fn csrf_cookie(config: &SessionConfig, token: &str) -> Cookie<'static> {
    Cookie::build((config.csrf_cookie_name.clone(), token.to_string()))
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Strict)
        .path("/")
        .build()
}
