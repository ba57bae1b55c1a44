//! Storage trait definitions

use async_trait::async_trait;

use super::StorageResult;

/// Trait for vault record stores
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Store a value under `key`, replacing any previous value
    async fn store(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Retrieve a value by key
    async fn retrieve(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Delete a value by key; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if a key exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Check if this store is hardware-backed
    fn is_hardware_backed(&self) -> bool;

    /// Human-readable name for this store
    fn backend_name(&self) -> &'static str;
}
