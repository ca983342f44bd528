//! Session issuance interfaces.
//!
//! The host platform owns sessions. This flow only asks it to sign a user in,
//! either by username with no password ([`SessionStore`]) or by handing over a
//! claims identity that the host maps to an account itself
//! ([`SignInSubsystem`]).

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::StorageError;
use crate::federation::claims::{AuthenticationProperties, ClaimsIdentity};

/// Reason reported by the session store for a refused sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoginFailureReason {
    /// No account with that username exists.
    UserNotFound,
    /// The account exists but is disabled.
    UserInactive,
    /// The licensed number of concurrent users is reached.
    UserLimitReached,
    /// The user already has a session bound to another address.
    UserLoggedFromDifferentIp,
    /// The session expired before the sign-in completed.
    SessionExpired,
    /// Any other store-reported failure.
    Unknown,
}

impl LoginFailureReason {
    /// Stable code used in the `error` query parameter of error redirects.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound => "UserNotFound",
            Self::UserInactive => "UserInactive",
            Self::UserLimitReached => "UserLimitReached",
            Self::UserLoggedFromDifferentIp => "UserLoggedFromDifferentIp",
            Self::SessionExpired => "SessionExpired",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for LoginFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An issued login session.
///
/// Ephemeral: handed to the HTTP boundary, which turns it into a cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSession {
    /// Opaque session token stored in the session cookie.
    pub session_id: String,

    /// The signed-in account.
    pub account_id: Uuid,

    /// Username of the signed-in account.
    pub username: String,

    /// Whether the cookie should outlive the browser session.
    pub persist_cookie: bool,

    /// Where the browser goes after sign-in, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,

    /// When the session was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

impl LoginSession {
    /// Creates a new session with a random token.
    #[must_use]
    pub fn new(account_id: Uuid, username: impl Into<String>, persist_cookie: bool) -> Self {
        Self {
            session_id: Uuid::new_v4().simple().to_string(),
            account_id,
            username: username.into(),
            persist_cookie,
            return_url: None,
            issued_at: OffsetDateTime::now_utc(),
        }
    }

    /// Sets the post sign-in redirect target.
    #[must_use]
    pub fn with_return_url(mut self, return_url: impl Into<String>) -> Self {
        self.return_url = Some(return_url.into());
        self
    }
}

/// Result of a sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationOutcome {
    /// The user is signed in.
    Success(LoginSession),
    /// The store refused the sign-in.
    Failure(LoginFailureReason),
}

impl AuthenticationOutcome {
    /// Returns `true` for [`AuthenticationOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the issued session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&LoginSession> {
        match self {
            Self::Success(session) => Some(session),
            Self::Failure(_) => None,
        }
    }
}

/// Password-less session issuance.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Sign a user in by username, without checking a password.
    ///
    /// A refused sign-in is reported as [`AuthenticationOutcome::Failure`];
    /// `Err` is reserved for storage failures.
    async fn authenticate_by_username(
        &self,
        username: &str,
        persist_cookie: bool,
    ) -> Result<AuthenticationOutcome, StorageError>;

    /// Look up a previously issued session by its token.
    async fn find_session(&self, session_id: &str) -> Result<Option<LoginSession>, StorageError>;
}

/// The host platform's claims-based sign-in entry point.
///
/// The subsystem locates or provisions the account itself using its own
/// claim-to-field mappings.
#[async_trait]
pub trait SignInSubsystem: Send + Sync {
    /// Sign in the holder of `identity`.
    async fn sign_in(
        &self,
        identity: ClaimsIdentity,
        properties: AuthenticationProperties,
    ) -> Result<AuthenticationOutcome, StorageError>;
}
