//! File storage backend
//!
//! Keeps every record in a single JSON file in the vault directory.
//! Values are base64-encoded; secrets arrive already sealed by the vault.

use async_trait::async_trait;
use base64::Engine;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use super::{SecureStorage, StorageError, StorageResult};

const STORAGE_FILE: &str = "vault.json";
const FORMAT_VERSION: u32 = 1;

/// JSON file storage backend
pub struct FileStorage {
    storage_dir: PathBuf,
    /// Map of key -> base64 value, mirrored to disk on every write
    entries: RwLock<HashMap<String, String>>,
}

/// File format for persistent storage
#[derive(Debug, Serialize, Deserialize)]
struct StorageFile {
    version: u32,
    entries: HashMap<String, String>,
}

impl FileStorage {
    /// Open the storage in the platform data directory
    pub fn new() -> StorageResult<Self> {
        Self::with_dir(Self::default_dir()?)
    }

    /// Open the storage in `storage_dir`, loading any existing records
    pub fn with_dir(storage_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let storage_dir = storage_dir.into();
        std::fs::create_dir_all(&storage_dir)?;

        let entries = Self::load(&storage_dir.join(STORAGE_FILE))?;
        debug!(
            "File storage initialized at {:?} with {} entries",
            storage_dir,
            entries.len()
        );

        Ok(Self {
            storage_dir,
            entries: RwLock::new(entries),
        })
    }

    /// Default storage directory
    pub fn default_dir() -> StorageResult<PathBuf> {
        ProjectDirs::from("dev", "secure-vault", "secure-vault")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| {
                StorageError::Unavailable("could not determine data directory".to_string())
            })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn storage_file_path(&self) -> PathBuf {
        self.storage_dir.join(STORAGE_FILE)
    }

    fn load(path: &Path) -> StorageResult<HashMap<String, String>> {
        if !path.exists() {
            debug!("No existing storage file found");
            return Ok(HashMap::new());
        }

        let contents = std::fs::read_to_string(path)?;
        let file: StorageFile = serde_json::from_str(&contents)?;
        Ok(file.entries)
    }

    async fn persist(&self, entries: &HashMap<String, String>) -> StorageResult<()> {
        let file = StorageFile {
            version: FORMAT_VERSION,
            entries: entries.clone(),
        };

        let contents = serde_json::to_string_pretty(&file)?;
        let path = self.storage_file_path();

        // Write atomically using a temp file
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        debug!("Saved {} entries to storage", entries.len());
        Ok(())
    }
}

#[async_trait]
impl SecureStorage for FileStorage {
    async fn store(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), base64_encode(value));
        self.persist(&entries).await?;

        debug!("Stored key: {}", key);
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let entries = self.entries.read().await;
        entries.get(key).map(|encoded| base64_decode(encoded)).transpose()
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.write().await;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
            debug!("Deleted key: {}", key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    fn is_hardware_backed(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "File Storage"
    }
}

fn base64_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn base64_decode(encoded: &str) -> StorageResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| StorageError::Encoding(format!("base64 decode error: {}", e)))
}
