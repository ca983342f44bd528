//! Authentication error types.
//!
//! This module defines the crate-level error returned by the login flow's
//! setup paths (configuration, URL construction, storage). Errors raised while
//! a callback is being processed are never returned to the browser; the
//! orchestrator turns them into error redirects.

use std::fmt;

use crate::federation::error::{MappingError, ResolutionError};
use crate::storage::StorageError;

/// Errors that can occur in the external login flow.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The incoming request is malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The identity provider callback could not be resolved to an identity.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The external identity could not be mapped to a local account.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// An error occurred while storing or retrieving account data.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The login configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the error was caused by the caller or the browser.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest { .. } | Self::Resolution(_))
    }

    /// Returns `true` if the error was caused by this service or its stores.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Mapping(_) | Self::Storage(_) | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::Resolution(_) => ErrorCategory::Federation,
            Self::Mapping(_) => ErrorCategory::Provisioning,
            Self::Storage(_) => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of login errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Request validation errors.
    Validation,
    /// Identity provider errors.
    Federation,
    /// Local account creation or linking errors.
    Provisioning,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Federation => write!(f, "federation"),
            Self::Provisioning => write!(f, "provisioning"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
