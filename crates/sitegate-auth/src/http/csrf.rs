//! CSRF protection for the local login widget.

use rand::RngCore;
use subtle::ConstantTimeEq;

/// Issues and validates anti-forgery tokens.
pub trait CsrfValidator: Send + Sync {
    /// Issues a new token.
    fn issue(&self) -> String;

    /// Returns `true` if the submitted form token is valid for the token
    /// held in the browser's CSRF cookie.
    fn validate(&self, form_token: Option<&str>, cookie_token: Option<&str>) -> bool;
}

/// Double-submit cookie validation.
///
/// The same random token is set as a cookie and embedded in the form; a
/// submission is valid when both are present and equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleSubmitCsrf;

/// Number of random bytes in a token.
const TOKEN_BYTES: usize = 32;

impl DoubleSubmitCsrf {
    /// Creates a validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CsrfValidator for DoubleSubmitCsrf {
    fn issue(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    fn validate(&self, form_token: Option<&str>, cookie_token: Option<&str>) -> bool {
        match (form_token, cookie_token) {
            (Some(form), Some(cookie)) if !form.is_empty() => {
                form.as_bytes().ct_eq(cookie.as_bytes()).into()
            }
            _ => false,
        }
    }
}
