//! Error types for the callback handling phases.
//!
//! Neither error is ever shown to the browser. The orchestrator logs the
//! details and redirects with the opaque code returned by `code()`.

use crate::storage::StorageError;

/// Redirect error code for any resolution failure.
pub const RESOLUTION_FAILED: &str = "ResolutionFailed";

/// Redirect error code for a failed account creation.
pub const ACCOUNT_CREATION_FAILED: &str = "AccountCreationFailed";

/// Errors raised while resolving a provider callback to an external identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    /// The provider reported an error instead of an assertion.
    #[error("Identity provider returned an error: {error}")]
    ProviderError {
        /// The provider's error value.
        error: String,
    },

    /// The callback carries no subject identifier.
    #[error("Callback is missing the subject identifier")]
    MissingSubject,

    /// The callback carries no signature.
    #[error("Callback is missing the signature")]
    MissingSignature,

    /// The signature does not match the callback parameters.
    #[error("Callback signature is invalid")]
    InvalidSignature,

    /// The timestamp is missing or unparseable.
    #[error("Callback timestamp is missing or invalid")]
    InvalidTimestamp,

    /// The callback or the browser carries no login state.
    #[error("Login state is missing")]
    MissingState,

    /// The callback state differs from the one bound to the browser.
    #[error("Login state does not match the browser")]
    StateMismatch,

    /// The login state was never issued, expired, or was already used.
    #[error("Login state is unknown, expired or already used")]
    UnknownState,

    /// The assertion is too old, or dated too far in the future.
    #[error("Assertion is outside the accepted time window ({age_secs}s)")]
    AssertionExpired {
        /// Signed age of the assertion in seconds (negative if in the future).
        age_secs: i64,
    },

    /// A provider or callback URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ResolutionError {
    /// Creates a `ProviderError`.
    #[must_use]
    pub fn provider_error(error: impl Into<String>) -> Self {
        Self::ProviderError {
            error: error.into(),
        }
    }

    /// Returns `true` if the callback failed an authenticity check.
    #[must_use]
    pub fn is_authenticity_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingSignature
                | Self::InvalidSignature
                | Self::InvalidTimestamp
                | Self::AssertionExpired { .. }
                | Self::MissingState
                | Self::StateMismatch
                | Self::UnknownState
        )
    }

    /// Opaque redirect error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        RESOLUTION_FAILED
    }
}

impl From<url::ParseError> for ResolutionError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// Errors raised while mapping an external identity to a local account.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    /// Creating the local account failed; nothing was written.
    #[error("Account creation failed: {0}")]
    AccountCreation(#[source] StorageError),

    /// A configured initial role exists in no role provider and the missing
    /// role policy is `abort`.
    #[error("Role not found in any role provider: {role}")]
    RoleNotFound {
        /// The missing role name.
        role: String,
    },

    /// A store failed outside of account creation.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl MappingError {
    /// Returns `true` if the failure happened while creating the account.
    #[must_use]
    pub fn is_account_creation(&self) -> bool {
        matches!(self, Self::AccountCreation(_) | Self::RoleNotFound { .. })
    }

    /// Opaque redirect error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccountCreation(_) | Self::RoleNotFound { .. } => ACCOUNT_CREATION_FAILED,
            Self::Storage(_) => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_codes_are_opaque() {
        assert_eq!(ResolutionError::MissingSubject.code(), "ResolutionFailed");
        assert_eq!(
            ResolutionError::provider_error("access_denied").code(),
            "ResolutionFailed"
        );
        assert!(ResolutionError::InvalidSignature.is_authenticity_failure());
        assert!(ResolutionError::UnknownState.is_authenticity_failure());
        assert_eq!(ResolutionError::StateMismatch.code(), "ResolutionFailed");
        assert!(!ResolutionError::MissingSubject.is_authenticity_failure());
    }

    #[test]
    fn test_mapping_codes() {
        let err = MappingError::AccountCreation(StorageError::backend("disk full"));
        assert_eq!(err.code(), "AccountCreationFailed");
        assert!(err.is_account_creation());
        assert!(err.to_string().contains("disk full"));

        let err = MappingError::RoleNotFound {
            role: "Ghosts".to_string(),
        };
        assert_eq!(err.code(), "AccountCreationFailed");

        let err = MappingError::from(StorageError::backend("x"));
        assert_eq!(err.code(), "Unknown");
        assert!(!err.is_account_creation());
    }
}
