//! Outcome of one execution attempt.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict a task returns for one attempt, and the verdict the Task Manager
/// reports back to the scheduling backend.
///
/// Serialized as SUCCESS / FAIL / RESCHEDULE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskResult {
    /// Work is done; the job's state is consumed.
    Success,

    /// Terminal failure; the backend must not fire this tag again.
    Fail,

    /// Try again later, subject to the retry ceiling.
    Reschedule,
}

impl TaskResult {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskResult::Reschedule)
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskResult::Success => "SUCCESS",
            TaskResult::Fail => "FAIL",
            TaskResult::Reschedule => "RESCHEDULE",
        };
        f.write_str(s)
    }
}
