//! OS Keychain storage backend
//!
//! Uses the system keychain for vault records:
//! - macOS: Keychain
//! - Windows: Credential Manager (DPAPI)
//! - Linux: Secret Service (GNOME Keyring, KWallet)

use async_trait::async_trait;
use base64::Engine;
use keyring::Entry;
use tracing::{debug, warn};

use super::{SecureStorage, StorageError, StorageResult};

/// Service name used for keychain entries
const SERVICE_NAME: &str = "secure-vault";

/// OS Keychain storage backend
pub struct KeychainStorage {
    /// Prefix for all keys, so several vaults can share a keychain
    prefix: String,
    available: bool,
}

impl KeychainStorage {
    pub fn new(prefix: Option<&str>) -> Self {
        let prefix = prefix.map(|p| format!("{}-", p)).unwrap_or_default();
        let available = Self::test_availability();

        if available {
            debug!("Keychain storage is available");
        } else {
            warn!("Keychain storage is not available");
        }

        Self { prefix, available }
    }

    fn test_availability() -> bool {
        let Ok(entry) = Entry::new(SERVICE_NAME, "__test_availability__") else {
            return false;
        };
        if entry.set_password("test").is_err() {
            return false;
        }
        let _ = entry.delete_password();
        true
    }

    fn entry(&self, key: &str) -> StorageResult<Entry> {
        if !self.available {
            return Err(StorageError::Keychain("keychain not available".to_string()));
        }
        let full_key = format!("{}{}", self.prefix, key);
        Entry::new(SERVICE_NAME, &full_key).map_err(|e| StorageError::Keychain(e.to_string()))
    }

    pub fn is_available(&self) -> bool {
        self.available
    }
}

#[async_trait]
impl SecureStorage for KeychainStorage {
    async fn store(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        // Keychains store strings
        let encoded = base64::engine::general_purpose::STANDARD.encode(value);

        self.entry(key)?
            .set_password(&encoded)
            .map_err(|e| StorageError::Keychain(e.to_string()))?;

        debug!("Stored key in keychain: {}", key);
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        match self.entry(key)?.get_password() {
            Ok(encoded) => base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map(Some)
                .map_err(|e| StorageError::Encoding(format!("base64 decode error: {}", e))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::Keychain(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        match self.entry(key)?.delete_password() {
            Ok(()) => {
                debug!("Deleted key from keychain: {}", key);
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::Keychain(e.to_string())),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.entry(key)?.get_password() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(StorageError::Keychain(e.to_string())),
        }
    }

    fn is_hardware_backed(&self) -> bool {
        self.available
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "macos")]
        return "macOS Keychain";

        #[cfg(target_os = "windows")]
        return "Windows Credential Manager";

        #[cfg(target_os = "linux")]
        return "Linux Secret Service";

        #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
        return "System Keychain";
    }
}
