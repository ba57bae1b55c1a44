//! The credential pair kept in the vault

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Login and password, zeroed when dropped.
///
/// Serialized as `{"login": .., "password": ..}`, the blob format the
/// vault stores.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    login: String,
    password: String,
}

impl Credential {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    /// The secret (use carefully)
    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn to_blob(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_blob(blob: &str) -> serde_json::Result<Self> {
        serde_json::from_str(blob)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
