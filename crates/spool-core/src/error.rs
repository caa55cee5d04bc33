use thiserror::Error;

use crate::domain::Tag;

/// Errors surfaced by the Task Manager's public API.
///
/// Most paths are fire-and-forget and never return these; the exception is
/// API misuse such as cancelling a non-singleton task.
#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown task type: {0}")]
    UnknownTaskType(String),
}

/// Error returned by a task's `execute`, or by its factory.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    Message(String),

    #[error("payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload must be a JSON object")]
    NotAnObject,
}

#[derive(Debug, Error)]
pub enum TagError {
    #[error("tag '{0}' has an empty task type")]
    EmptyTypeId(Tag),

    #[error("tag '{0}' names an unregistered task type '{1}'")]
    UnknownType(Tag, String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend rejected tag '{tag}': {reason}")]
    Rejected { tag: Tag, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
}
