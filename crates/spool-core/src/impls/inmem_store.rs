//! InMemoryPayloadStore - 開発・テスト用の PayloadStore

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::ports::{PayloadStore, StoredValue};

/// Nothing survives the process. Use [`JsonFileStore`](super::JsonFileStore)
/// when payloads must outlive a restart.
#[derive(Debug, Default)]
pub struct InMemoryPayloadStore {
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl InMemoryPayloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }
}

#[async_trait]
impl PayloadStore for InMemoryPayloadStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: StoredValue) -> Result<(), StoreError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blob_put_get_delete() {
        let store = InMemoryPayloadStore::new();
        store.put_blob("k", b"{}".to_vec()).await.unwrap();
        assert_eq!(store.get_blob("k").await.unwrap(), Some(b"{}".to_vec()));

        store.delete("k").await.unwrap();
        assert_eq!(store.get_blob("k").await.unwrap(), None);
        // deleting again is fine
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn scalars_fall_back_to_default() {
        let store = InMemoryPayloadStore::new();
        assert_eq!(store.get_long("counter", 7).await.unwrap(), 7);
        assert!(store.get_bool("enabled", true).await.unwrap());
        assert_eq!(store.get_string("name", "none").await.unwrap(), "none");

        store.put_long("counter", 3).await.unwrap();
        store.put_bool("enabled", false).await.unwrap();
        store.put_string("name", "spool").await.unwrap();

        assert_eq!(store.get_long("counter", 7).await.unwrap(), 3);
        assert!(!store.get_bool("enabled", true).await.unwrap());
        assert_eq!(store.get_string("name", "none").await.unwrap(), "spool");
    }

    #[tokio::test]
    async fn mismatched_kind_reads_as_default() {
        let store = InMemoryPayloadStore::new();
        store.put_string("counter", "not a number").await.unwrap();
        assert_eq!(store.get_long("counter", -1).await.unwrap(), -1);
        assert_eq!(store.get_blob("counter").await.unwrap(), None);
    }
}
