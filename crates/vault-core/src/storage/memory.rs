//! In-memory record store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;

use super::{SecureStorage, StorageError, StorageResult};

/// Record store that lives only as long as the process
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    failing: AtomicBool,
    /// Writes allowed before stores start failing; `None` is unlimited
    write_budget: Mutex<Option<usize>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail, to exercise error paths
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Let the next `writes` stores succeed and fail every store after
    /// them; `None` lifts the limit
    pub fn fail_writes_after(&self, writes: Option<usize>) {
        *self.budget() = writes;
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn budget(&self) -> std::sync::MutexGuard<'_, Option<usize>> {
        self.write_budget
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_write(&self) -> StorageResult<()> {
        self.check()?;
        let mut budget = self.budget();
        match budget.as_mut() {
            Some(0) => Err(StorageError::Unavailable(
                "memory storage write limit reached".to_string(),
            )),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory storage set to fail".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SecureStorage for MemoryStorage {
    async fn store(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.check_write()?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.check()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.check()?;
        Ok(self.entries.read().await.contains_key(key))
    }

    fn is_hardware_backed(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "Memory Storage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_retrieve_delete() {
        let storage = MemoryStorage::new();

        storage.store("creds", b"sealed").await.unwrap();
        assert_eq!(storage.retrieve("creds").await.unwrap(), Some(b"sealed".to_vec()));
        assert!(storage.exists("creds").await.unwrap());

        storage.delete("creds").await.unwrap();
        assert_eq!(storage.retrieve("creds").await.unwrap(), None);
        storage.delete("creds").await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let storage = MemoryStorage::new();
        storage.set_failing(true);

        assert!(matches!(
            storage.store("k", b"v").await,
            Err(StorageError::Unavailable(_))
        ));
        assert!(storage.retrieve("k").await.is_err());

        storage.set_failing(false);
        storage.store("k", b"v").await.unwrap();
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_write_limit() {
        let storage = MemoryStorage::new();
        storage.fail_writes_after(Some(1));

        storage.store("a", b"1").await.unwrap();
        assert!(matches!(
            storage.store("b", b"2").await,
            Err(StorageError::Unavailable(_))
        ));
        assert_eq!(storage.retrieve("a").await.unwrap(), Some(b"1".to_vec()));
        storage.delete("a").await.unwrap();

        storage.fail_writes_after(None);
        storage.store("b", b"2").await.unwrap();
    }
}
