//! Tag codec: the single string identity of a pending scheduled job.
//!
//! A tag is `type_id` or `type_id#data_key`. The type identifier never
//! contains the separator (the registry refuses such names), so decoding
//! splits on the first `#` only and everything after it belongs to the key.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TagError;

/// Reserved separator between the type identifier and the data key.
pub const TAG_SEPARATOR: char = '#';

/// Opaque identity of one pending scheduled job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    /// Wrap a raw tag string handed back by a scheduling backend.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// (type identifier, optional data key) pair behind a tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskIdentity {
    pub type_id: String,
    pub data_key: Option<String>,
}

impl TaskIdentity {
    pub fn new(type_id: impl Into<String>, data_key: Option<String>) -> Self {
        Self {
            type_id: type_id.into(),
            data_key,
        }
    }

    pub fn to_tag(&self) -> Tag {
        encode(&self.type_id, self.data_key.as_deref())
    }
}

/// Encode a type identifier and optional data key into a tag.
pub fn encode(type_id: &str, data_key: Option<&str>) -> Tag {
    match data_key {
        Some(key) => Tag(format!("{type_id}{TAG_SEPARATOR}{key}")),
        None => Tag(type_id.to_string()),
    }
}

/// Decode a tag back into its identity.
///
/// Only the shape is checked here. Whether the type identifier names a
/// registered task is the registry's call.
pub fn decode(tag: &Tag) -> Result<TaskIdentity, TagError> {
    let (type_id, data_key) = match tag.as_str().split_once(TAG_SEPARATOR) {
        Some((type_id, key)) => (type_id, Some(key.to_string())),
        None => (tag.as_str(), None),
    };
    if type_id.is_empty() {
        return Err(TagError::EmptyTypeId(tag.clone()));
    }
    Ok(TaskIdentity::new(type_id, data_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::bare("net.register.v1", None)]
    #[case::with_key("net.register.v1", Some("01HZX3"))]
    #[case::key_with_separator("topic.subscribe.v1", Some("a#b#c"))]
    #[case::empty_key("topic.subscribe.v1", Some(""))]
    fn decode_inverts_encode(#[case] type_id: &str, #[case] data_key: Option<&str>) {
        let tag = encode(type_id, data_key);
        let identity = decode(&tag).unwrap();
        assert_eq!(identity.type_id, type_id);
        assert_eq!(identity.data_key.as_deref(), data_key);
    }

    #[test]
    fn bare_tag_equals_type_id() {
        assert_eq!(encode("image.fetch.v1", None).as_str(), "image.fetch.v1");
    }

    #[test]
    fn decode_splits_on_first_separator_only() {
        let identity = decode(&Tag::new("a.b#k1#k2")).unwrap();
        assert_eq!(identity.type_id, "a.b");
        assert_eq!(identity.data_key.as_deref(), Some("k1#k2"));
    }

    #[rstest]
    #[case::empty("")]
    #[case::only_key("#orphan")]
    fn empty_type_segment_is_malformed(#[case] raw: &str) {
        let err = decode(&Tag::new(raw)).unwrap_err();
        assert!(matches!(err, TagError::EmptyTypeId(_)));
    }

    #[test]
    fn identity_to_tag_matches_encode() {
        let identity = TaskIdentity::new("x.y.v1", Some("key".to_string()));
        assert_eq!(identity.to_tag(), encode("x.y.v1", Some("key")));
    }
}
