//! Persisted payload attached to a scheduled job.
//!
//! The payload is a JSON object. The Task Manager owns one reserved field,
//! [`RETRY_COUNT_FIELD`], which it increments on every scheduled firing; the
//! rest belongs to the caller and the task.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PayloadError;

/// Reserved field carrying the number of scheduled firings so far.
pub const RETRY_COUNT_FIELD: &str = "retry_count";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a payload from any struct that serializes to a JSON object.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, PayloadError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(PayloadError::NotAnObject),
        }
    }

    /// Decode the payload into a typed struct. Unknown fields (including the
    /// retry counter) are ignored unless `T` denies them.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(key, value);
        self
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of scheduled firings recorded so far.
    ///
    /// Accepts a number or a numeric string; anything else counts as zero.
    pub fn retry_count(&self) -> u32 {
        match self.0.get(RETRY_COUNT_FIELD) {
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
            Some(Value::String(s)) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Increment the retry counter and return the new value.
    pub fn increment_retry_count(&mut self) -> u32 {
        let next = self.retry_count().saturating_add(1);
        self.0.insert(RETRY_COUNT_FIELD.to_string(), Value::from(next));
        next
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PayloadError> {
        match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(PayloadError::NotAnObject),
        }
    }
}
