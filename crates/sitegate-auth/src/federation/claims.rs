//! Claims identity handed to the host sign-in subsystem.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Claim type carrying the external subject identifier.
pub const SUBJECT_CLAIM: &str = "sub";

/// Claim type carrying the email address.
pub const EMAIL_CLAIM: &str = "email";

/// Prefix of claims the host maps onto account or profile fields,
/// e.g. `ClaimsMapping:Profile.FirstName`.
pub const CLAIMS_MAPPING_PREFIX: &str = "ClaimsMapping:";

/// Key in [`AuthenticationProperties::items`] naming the registered external
/// provider.
pub const EXTERNAL_PROVIDER_ITEM: &str = "externalProviderName";

/// A single claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type (e.g., "sub", "email").
    pub kind: String,

    /// Claim value.
    pub value: String,
}

impl Claim {
    /// Creates a new claim.
    #[must_use]
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// An authenticated identity expressed as a list of claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsIdentity {
    /// How the identity was authenticated.
    pub authentication_type: String,

    /// Claims in the order they were added.
    pub claims: Vec<Claim>,
}

impl ClaimsIdentity {
    /// Creates an identity with no claims.
    #[must_use]
    pub fn new(authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_type: authentication_type.into(),
            claims: Vec::new(),
        }
    }

    /// Adds a claim.
    #[must_use]
    pub fn with_claim(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_claim(kind, value);
        self
    }

    /// Adds a claim in place.
    pub fn add_claim(&mut self, kind: impl Into<String>, value: impl Into<String>) {
        self.claims.push(Claim::new(kind, value));
    }

    /// Returns the value of the first claim of the given type.
    #[must_use]
    pub fn find_first(&self, kind: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.value.as_str())
    }

    /// Returns the subject identifier.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.find_first(SUBJECT_CLAIM)
    }

    /// Returns the value mapped to a host field, e.g. `Profile.FirstName`.
    #[must_use]
    pub fn mapped(&self, field: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| {
                c.kind
                    .strip_prefix(CLAIMS_MAPPING_PREFIX)
                    .is_some_and(|f| f == field)
            })
            .map(|c| c.value.as_str())
    }
}

/// Properties accompanying a claims sign-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationProperties {
    /// Where the browser goes after the sign-in.
    pub redirect_uri: String,

    /// Additional string items.
    #[serde(default)]
    pub items: BTreeMap<String, String>,
}

impl AuthenticationProperties {
    /// Creates properties with the given redirect target.
    #[must_use]
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            items: BTreeMap::new(),
        }
    }

    /// Adds an item.
    #[must_use]
    pub fn with_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.insert(key.into(), value.into());
        self
    }

    /// The registered external provider name, if set.
    #[must_use]
    pub fn external_provider_name(&self) -> Option<&str> {
        self.items.get(EXTERNAL_PROVIDER_ITEM).map(String::as_str)
    }
}
