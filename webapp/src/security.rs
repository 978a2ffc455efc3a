//! Secret handling and validation of values that arrive on the login callback.

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Longest authorization code accepted from the provider
pub const MAX_AUTH_CODE_LEN: usize = 4096;

/// Secret string (client secret) that zeroizes on drop
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecureString(***)")
    }
}

/// Validate the `state` echoed by the provider (we only ever issue UUIDs)
pub fn validate_state_param(state: &str) -> bool {
    uuid::Uuid::parse_str(state).is_ok()
}

/// Validate an authorization code: non-empty, bounded, printable ASCII
pub fn validate_auth_code(code: &str) -> bool {
    if code.is_empty() || code.len() > MAX_AUTH_CODE_LEN {
        return false;
    }
    code.chars().all(|c| c.is_ascii_graphic())
}

/// Validate a session id read from the cookie (64 lowercase hex chars)
pub fn validate_session_id(id: &str) -> bool {
    id.len() == 64 && id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

/// Mint a fresh session id from 32 random bytes
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
