//! Record layout of the software vault
//!
//! Each gate lives in a single record so that setting it is one write.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::storage::{SecureStorage, StorageError, StorageResult};

/// Shared code/biometry failure counter
pub(crate) const ATTEMPTS: &str = "attempts";
/// Credential blob sealed under the data key
pub(crate) const CREDS: &str = "creds";
/// [`CodeGate`]
pub(crate) const CODE_GATE: &str = "code.gate";
/// [`BiometryGate`]
pub(crate) const BIOMETRY_GATE: &str = "biometry.gate";
/// Last enrollment seen by `has_fingerprint_changed`
pub(crate) const BIOMETRY_OBSERVED: &str = "biometry.observed";

const ALL: [&str; 5] = [ATTEMPTS, CREDS, CODE_GATE, BIOMETRY_GATE, BIOMETRY_OBSERVED];

/// Data key wrapped under the key derived from the unlock code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CodeGate {
    pub salt: String,
    pub wrapped_key: String,
}

/// Data key wrapped under the sensor's biometric key, bound to the
/// enrollment it was created for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BiometryGate {
    pub wrapped_key: String,
    pub enrollment: String,
}

/// Which records are present
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub creds: bool,
    pub code: bool,
    pub biometry: bool,
}

impl Snapshot {
    pub fn has_gate(&self) -> bool {
        self.code || self.biometry
    }

    /// Credentials nobody can unlock are residue of an interrupted clean
    pub fn is_consistent(&self) -> bool {
        !self.creds || self.has_gate()
    }
}

/// Text records over a [`SecureStorage`]
pub(crate) struct Records {
    storage: Arc<dyn SecureStorage>,
}

impl Records {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    pub fn backend_name(&self) -> &'static str {
        self.storage.backend_name()
    }

    pub async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.storage
            .retrieve(key)
            .await?
            .map(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|e| StorageError::Encoding(format!("{}: {}", key, e)))
            })
            .transpose()
    }

    pub async fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        self.storage.store(key, value.as_bytes()).await
    }

    pub async fn remove(&self, key: &str) -> StorageResult<()> {
        self.storage.delete(key).await
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let Some(text) = self.get(key).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        self.put(key, &serde_json::to_string(value)?).await
    }

    pub async fn code_gate(&self) -> StorageResult<Option<CodeGate>> {
        self.get_json(CODE_GATE).await
    }

    pub async fn set_code_gate(&self, gate: &CodeGate) -> StorageResult<()> {
        self.put_json(CODE_GATE, gate).await
    }

    pub async fn biometry_gate(&self) -> StorageResult<Option<BiometryGate>> {
        self.get_json(BIOMETRY_GATE).await
    }

    pub async fn set_biometry_gate(&self, gate: &BiometryGate) -> StorageResult<()> {
        self.put_json(BIOMETRY_GATE, gate).await
    }

    /// Failed unlock attempts; an unreadable counter counts as zero
    pub async fn attempts(&self) -> StorageResult<u32> {
        let Some(text) = self.get(ATTEMPTS).await? else {
            return Ok(0);
        };
        Ok(text.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring malformed attempt counter");
            0
        }))
    }

    pub async fn set_attempts(&self, attempts: u32) -> StorageResult<()> {
        if attempts == 0 {
            self.remove(ATTEMPTS).await
        } else {
            self.put(ATTEMPTS, &attempts.to_string()).await
        }
    }

    /// Presence of each record; a gate that does not parse is an error
    pub async fn snapshot(&self) -> StorageResult<Snapshot> {
        Ok(Snapshot {
            creds: self.storage.exists(CREDS).await?,
            code: self.code_gate().await?.is_some(),
            biometry: self.biometry_gate().await?.is_some(),
        })
    }

    /// Delete every record
    pub async fn wipe(&self) -> StorageResult<()> {
        for key in ALL {
            self.storage.delete(key).await?;
        }
        debug!("Deleted all vault records");
        Ok(())
    }
}
