use super::Storage;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Entries {
    items: Vec<(String, String)>,
    bytes: usize,
}

impl Entries {
    fn position(&self, key: &str) -> Option<usize> {
        self.items.iter().position(|(k, _)| k == key)
    }
}

fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

/// In-memory storage area with insertion order and a byte quota, sized the way
/// browsers size theirs (key plus value).
pub struct MemoryStorage {
    entries: Mutex<Entries>,
    max_bytes: usize,
}

impl MemoryStorage {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            max_bytes,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Bytes currently in use.
    pub fn used_bytes(&self) -> usize {
        self.lock().map(|e| e.bytes).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>> {
        self.entries.lock().map_err(|_| {
            Error::storage_with_context(
                "storage lock poisoned",
                ErrorContext::new().with_source("memory_storage"),
            )
        })
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.lock()?;
        Ok(entries
            .position(key)
            .map(|idx| entries.items[idx].1.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.lock()?;
        let existing = entries.position(key);
        let freed = existing
            .map(|idx| entry_size(key, &entries.items[idx].1))
            .unwrap_or(0);
        let needed = entry_size(key, value);
        let available = self.max_bytes.saturating_sub(entries.bytes - freed);
        if needed > available {
            return Err(Error::StorageFull {
                key: key.to_string(),
                needed,
                available,
            });
        }
        entries.bytes = entries.bytes - freed + needed;
        match existing {
            Some(idx) => entries.items[idx].1 = value.to_string(),
            None => entries.items.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self.lock()?;
        match entries.position(key) {
            Some(idx) => {
                let (k, v) = entries.items.remove(idx);
                entries.bytes -= entry_size(&k, &v);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = self.lock()?;
        entries.items.clear();
        entries.bytes = 0;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.items.iter().map(|(k, _)| k.clone()).collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.lock()?.items.len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_insertion_order_on_overwrite() {
        let storage = MemoryStorage::unbounded();
        storage.set("a", "1").await.unwrap();
        storage.set("b", "2").await.unwrap();
        storage.set("a", "3").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["a", "b"]);
        assert_eq!(storage.get("a").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn refuses_writes_past_quota() {
        let storage = MemoryStorage::new(10);
        storage.set("k1", "abcd").await.unwrap();
        let err = storage.set("k2", "abcdef").await.unwrap_err();
        assert!(err.is_storage_full());
        assert_eq!(storage.len().await.unwrap(), 1);
        assert_eq!(storage.used_bytes(), 6);
    }

    #[tokio::test]
    async fn overwrite_reuses_the_replaced_bytes() {
        let storage = MemoryStorage::new(10);
        storage.set("k", "12345678").await.unwrap();
        storage.set("k", "87654321").await.unwrap();
        assert_eq!(storage.used_bytes(), 9);
    }

    #[tokio::test]
    async fn remove_and_clear_release_space() {
        let storage = MemoryStorage::new(8);
        storage.set("a", "123").await.unwrap();
        storage.set("b", "123").await.unwrap();
        assert!(storage.remove("a").await.unwrap());
        assert!(!storage.remove("a").await.unwrap());
        assert_eq!(storage.used_bytes(), 4);
        storage.clear().await.unwrap();
        assert_eq!(storage.used_bytes(), 0);
        assert!(storage.keys().await.unwrap().is_empty());
    }
}
