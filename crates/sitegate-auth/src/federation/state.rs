//! Pending external logins.
//!
//! Every login started at the login path gets a random state value. It is
//! set as a cookie on the browser and travels to the provider inside the
//! callback URL, so the provider's signature covers it. A callback is
//! accepted only when its state matches the cookie, was issued here, is not
//! older than the configured lifetime, and has not been used before.

use std::sync::Arc;
use std::time::Duration;

use papaya::HashMap as PapayaHashMap;
use rand::RngCore;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use super::error::ResolutionError;

/// Callback URL parameter carrying the login state.
pub const STATE_PARAM: &str = "state";

/// Number of random bytes in a state value.
const STATE_BYTES: usize = 32;

/// Single-use registry of issued login states.
#[derive(Debug, Clone)]
pub struct LoginStates {
    pending: Arc<PapayaHashMap<String, OffsetDateTime>>,
    lifetime: Duration,
}

impl LoginStates {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(lifetime: Duration) -> Self {
        Self {
            pending: Arc::new(PapayaHashMap::new()),
            lifetime,
        }
    }

    /// How long an issued state stays usable.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Number of issued, unused states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.pin().len()
    }

    /// Returns `true` if no state is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Issues a new state.
    pub fn issue(&self) -> String {
        self.issue_at(OffsetDateTime::now_utc())
    }

    /// Issues a new state against an explicit clock.
    pub fn issue_at(&self, now: OffsetDateTime) -> String {
        self.purge_expired(now);

        let mut bytes = [0u8; STATE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let state = hex::encode(bytes);
        self.pending.pin().insert(state.clone(), now);
        state
    }

    /// Consumes the state of a callback.
    ///
    /// # Errors
    ///
    /// - [`ResolutionError::MissingState`] if the callback or the browser
    ///   carries no state
    /// - [`ResolutionError::StateMismatch`] if they differ
    /// - [`ResolutionError::UnknownState`] if the state was never issued,
    ///   expired, or was already used
    pub fn consume(
        &self,
        callback_state: Option<&str>,
        cookie_state: Option<&str>,
    ) -> Result<(), ResolutionError> {
        self.consume_at(callback_state, cookie_state, OffsetDateTime::now_utc())
    }

    /// Consumes the state of a callback against an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`LoginStates::consume`].
    pub fn consume_at(
        &self,
        callback_state: Option<&str>,
        cookie_state: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<(), ResolutionError> {
        let callback_state = callback_state
            .filter(|s| !s.is_empty())
            .ok_or(ResolutionError::MissingState)?;
        let cookie_state = cookie_state
            .filter(|s| !s.is_empty())
            .ok_or(ResolutionError::MissingState)?;
        if !bool::from(callback_state.as_bytes().ct_eq(cookie_state.as_bytes())) {
            return Err(ResolutionError::StateMismatch);
        }

        // Removal is atomic: of two concurrent callbacks only one gets it.
        let issued_at = self
            .pending
            .pin()
            .remove(callback_state)
            .copied()
            .ok_or(ResolutionError::UnknownState)?;
        if self.is_expired(issued_at, now) {
            return Err(ResolutionError::UnknownState);
        }
        Ok(())
    }

    fn is_expired(&self, issued_at: OffsetDateTime, now: OffsetDateTime) -> bool {
        let age = now - issued_at;
        age.is_positive() && age.unsigned_abs() > self.lifetime
    }

    fn purge_expired(&self, now: OffsetDateTime) {
        let pending = self.pending.pin();
        let expired: Vec<String> = pending
            .iter()
            .filter(|(_, issued_at)| self.is_expired(**issued_at, now))
            .map(|(state, _)| state.clone())
            .collect();
        for state in &expired {
            pending.remove(state);
        }
        if !expired.is_empty() {
            tracing::debug!(purged = expired.len(), "Expired login states removed");
        }
    }
}
