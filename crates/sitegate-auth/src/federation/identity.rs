//! External identity resolved from a provider callback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An identity authenticated by the external provider.
///
/// Created for every callback and never persisted itself; the account mapper
/// links it to a local account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// Subject identifier, unique within the provider. Never empty.
    pub external_id: String,

    /// Name of the provider that authenticated the subject.
    pub provider_name: String,

    /// Additional claims asserted by the provider.
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
}

impl ExternalIdentity {
    /// Creates an identity without claims.
    #[must_use]
    pub fn new(external_id: impl Into<String>, provider_name: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            provider_name: provider_name.into(),
            claims: BTreeMap::new(),
        }
    }

    /// Adds a claim.
    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    /// Returns a claim value.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).map(String::as_str)
    }
}
