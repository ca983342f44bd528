//! In-memory session store.
//!
//! Issues password-less sessions for accounts held by an
//! [`InMemoryAccountStorage`]. Sessions older than the configured lifetime
//! are no longer found and are purged whenever a new session is issued.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use sitegate_auth::storage::{
    AccountStorage, AuthenticationOutcome, LoginFailureReason, LoginSession, SessionStore,
    StorageError,
};
use time::OffsetDateTime;

use crate::accounts::InMemoryAccountStorage;

/// Session store sharing the account state of an [`InMemoryAccountStorage`].
#[derive(Debug, Clone)]
pub struct InMemorySessionStore {
    accounts: InMemoryAccountStorage,
    sessions: Arc<PapayaHashMap<String, LoginSession>>,
    /// Live sessions, reserved before insertion so the limit holds under
    /// concurrent sign-ins.
    active: Arc<AtomicUsize>,
    max_sessions: Option<usize>,
    lifetime: Option<Duration>,
}

impl InMemorySessionStore {
    /// Creates a store without a session limit or lifetime.
    #[must_use]
    pub fn new(accounts: InMemoryAccountStorage) -> Self {
        Self {
            accounts,
            sessions: Arc::new(PapayaHashMap::new()),
            active: Arc::new(AtomicUsize::new(0)),
            max_sessions: None,
            lifetime: None,
        }
    }

    /// Refuses sign-ins with `UserLimitReached` once `max` live sessions
    /// exist.
    #[must_use]
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = Some(max);
        self
    }

    /// Expires sessions `lifetime` after they were issued.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns `true` if no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes expired sessions, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(OffsetDateTime::now_utc())
    }

    fn purge_expired_at(&self, now: OffsetDateTime) -> usize {
        if self.lifetime.is_none() {
            return 0;
        }
        let sessions = self.sessions.pin();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| self.is_expired(session, now))
            .map(|(id, _)| id.clone())
            .collect();

        let mut removed = 0;
        for id in &expired {
            if sessions.remove(id).is_some() {
                self.active.fetch_sub(1, Ordering::SeqCst);
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "Expired sessions purged");
        }
        removed
    }

    fn is_expired(&self, session: &LoginSession, now: OffsetDateTime) -> bool {
        match self.lifetime {
            Some(lifetime) => {
                let age = now - session.issued_at;
                age.is_positive() && age.unsigned_abs() > lifetime
            }
            None => false,
        }
    }

    /// Reserves a slot for a new session.
    fn reserve(&self) -> bool {
        match self.max_sessions {
            Some(max) => self
                .active
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (n < max).then_some(n + 1)
                })
                .is_ok(),
            None => {
                self.active.fetch_add(1, Ordering::SeqCst);
                true
            }
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn authenticate_by_username(
        &self,
        username: &str,
        persist_cookie: bool,
    ) -> Result<AuthenticationOutcome, StorageError> {
        let Some(account) = self.accounts.find_by_username(username).await? else {
            return Ok(AuthenticationOutcome::Failure(
                LoginFailureReason::UserNotFound,
            ));
        };
        if !account.is_active() {
            return Ok(AuthenticationOutcome::Failure(
                LoginFailureReason::UserInactive,
            ));
        }

        self.purge_expired();
        if !self.reserve() {
            return Ok(AuthenticationOutcome::Failure(
                LoginFailureReason::UserLimitReached,
            ));
        }

        let session = LoginSession::new(account.id, account.username, persist_cookie);
        self.sessions
            .pin()
            .insert(session.session_id.clone(), session.clone());
        tracing::debug!(
            account_id = %session.account_id,
            persist_cookie,
            "Session issued"
        );
        Ok(AuthenticationOutcome::Success(session))
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<LoginSession>, StorageError> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .sessions
            .pin()
            .get(session_id)
            .filter(|session| !self.is_expired(session, now))
            .cloned())
    }
}
