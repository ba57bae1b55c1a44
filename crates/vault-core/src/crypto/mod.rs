//! Cryptographic primitives for the software vault
//!
//! This module provides:
//! - AES-256-GCM sealing of records and of wrapped keys
//! - Argon2id derivation of a key-encryption key from an unlock code
//! - Vault keys that are zeroed on drop

mod encryption;
mod key_derivation;
mod secure_memory;

pub use encryption::{open, open_string, seal, seal_string, unwrap_key, wrap_key, SealedBox};
pub use key_derivation::{derive_code_key, generate_salt, KdfParams};
pub use secure_memory::VaultKey;

use thiserror::Error;

/// Crypto failures; the vault maps them onto wire codes by context
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("malformed sealed data: {0}")]
    Malformed(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}
