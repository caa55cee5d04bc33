//! Events reported to the [`EventSink`](crate::ports::EventSink).
//!
//! Every failure the Task Manager swallows on a fire-and-forget path shows
//! up here, next to the lifecycle transitions tests want to assert on.

use chrono::{DateTime, Utc};

use super::outcome::TaskResult;
use super::tag::Tag;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskEventKind {
    /// A tag was handed to the backend.
    Scheduled { type_id: String, tag: Tag },

    /// A singleton tag was cancelled at the backend.
    Cancelled { tag: Tag },

    /// The type identifier is not in the registry.
    UnknownTaskType { type_id: String },

    /// A tag could not be resolved to a registered task.
    MalformedTag { tag: Tag, reason: String },

    /// The registry factory failed to build the task.
    InstantiationFailed { type_id: String, reason: String },

    /// The task returned an error or panicked.
    ExecutionFailed { type_id: String, reason: String },

    /// A stored payload could not be decoded and was ignored.
    PayloadCorrupt { data_key: String, reason: String },

    /// A payload store operation failed.
    StoreFailed { data_key: String, reason: String },

    /// The scheduling backend rejected a schedule or cancel call.
    BackendFailed { tag: Tag, reason: String },

    /// A scheduled firing finished with the given verdict.
    Fired {
        tag: Tag,
        result: TaskResult,
        retry_count: Option<u32>,
    },

    /// The retry ceiling was exceeded; RESCHEDULE became FAIL.
    RetriesExhausted {
        tag: Tag,
        retry_count: u32,
        ceiling: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub at: DateTime<Utc>,
    pub kind: TaskEventKind,
}

impl TaskEvent {
    pub fn now(kind: TaskEventKind) -> Self {
        Self {
            at: Utc::now(),
            kind,
        }
    }

    /// Is this a failure the caller never saw as a return value?
    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            TaskEventKind::UnknownTaskType { .. }
                | TaskEventKind::MalformedTag { .. }
                | TaskEventKind::InstantiationFailed { .. }
                | TaskEventKind::ExecutionFailed { .. }
                | TaskEventKind::PayloadCorrupt { .. }
                | TaskEventKind::StoreFailed { .. }
                | TaskEventKind::BackendFailed { .. }
                | TaskEventKind::RetriesExhausted { .. }
        )
    }
}
