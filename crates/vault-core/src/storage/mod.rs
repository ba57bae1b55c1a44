//! Record stores for the software vault
//!
//! Three backends are provided:
//! 1. OS keychain (hardware-backed where available)
//! 2. JSON file in the vault directory
//! 3. In-memory (tests, ephemeral vaults)
//!
//! Stores hold opaque bytes; anything secret is sealed by the vault before
//! it gets here.

mod file;
mod keychain;
mod memory;
mod traits;

pub use file::FileStorage;
pub use keychain::KeychainStorage;
pub use memory::MemoryStorage;
pub use traits::SecureStorage;

use thiserror::Error;

/// Result type alias for record store operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Record store failures
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keychain(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}
