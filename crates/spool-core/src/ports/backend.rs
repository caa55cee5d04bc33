//! SchedulingBackend port - the external trigger that fires tags when due
//!
//! The backend owns its pending-job bookkeeping (including across restarts)
//! and calls `TaskManager::handle_scheduled_task(tag)` when a tag is due. It
//! also owns the backoff between RESCHEDULE verdicts; the Task Manager only
//! reports verdicts and never re-schedules on its own.

use async_trait::async_trait;

use crate::domain::{Tag, TaskOptions, TaskResult};
use crate::error::BackendError;

#[async_trait]
pub trait SchedulingBackend: Send + Sync {
    /// Register `tag` to fire according to `options`. When a job with the
    /// same tag is pending, `options.replace()` decides whether it is
    /// replaced or kept.
    async fn schedule(&self, tag: &Tag, options: &TaskOptions) -> Result<(), BackendError>;

    /// Prevent future firings of `tag`. An in-flight firing is not affected.
    async fn cancel(&self, tag: &Tag) -> Result<(), BackendError>;
}

/// The callback side of the contract: what a backend invokes when a tag is
/// due. Implemented by `TaskManager`.
#[async_trait]
pub trait ScheduledTaskHandler: Send + Sync {
    async fn handle_scheduled_task(&self, tag: &Tag) -> TaskResult;
}
