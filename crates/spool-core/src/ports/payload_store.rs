//! PayloadStore port - string-keyed persistence for payloads and settings
//!
//! The store only sees opaque values. Payload blobs are written and read by
//! the Task Manager; scalar settings are there for tasks (counters, flags).
//!
//! # 実装
//! - **InMemoryPayloadStore**: テスト・開発用
//! - **JsonFileStore**: プロセス再起動をまたいで残る

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// One stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StoredValue {
    Blob(Vec<u8>),
    String(String),
    Long(i64),
    Bool(bool),
}

/// Key-value persistence consumed by the Task Manager.
///
/// Implementations must be safe under concurrent access from several tags
/// firing at once. Typed getters fall back to the default when the key is
/// missing or holds a value of another kind.
#[async_trait]
pub trait PayloadStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError>;

    async fn put(&self, key: &str, value: StoredValue) -> Result<(), StoreError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.get(key).await? {
            Some(StoredValue::Blob(bytes)) => Ok(Some(bytes)),
            _ => Ok(None),
        }
    }

    async fn put_blob(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.put(key, StoredValue::Blob(bytes)).await
    }

    async fn get_string(&self, key: &str, default: &str) -> Result<String, StoreError> {
        match self.get(key).await? {
            Some(StoredValue::String(s)) => Ok(s),
            _ => Ok(default.to_string()),
        }
    }

    async fn put_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put(key, StoredValue::String(value.to_string())).await
    }

    async fn get_long(&self, key: &str, default: i64) -> Result<i64, StoreError> {
        match self.get(key).await? {
            Some(StoredValue::Long(n)) => Ok(n),
            _ => Ok(default),
        }
    }

    async fn put_long(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.put(key, StoredValue::Long(value)).await
    }

    async fn get_bool(&self, key: &str, default: bool) -> Result<bool, StoreError> {
        match self.get(key).await? {
            Some(StoredValue::Bool(b)) => Ok(b),
            _ => Ok(default),
        }
    }

    async fn put_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.put(key, StoredValue::Bool(value)).await
    }
}
