//! Task contract and the descriptor every registered task type declares.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{Payload, Tag, TaskOptions, TaskResult};
use crate::error::TaskError;
use crate::ports::PayloadStore;

/// A unit of deferred work.
///
/// Retries are at-least-once, so `execute` should be idempotent whenever
/// that is feasible.
///
/// # Example
/// ```ignore
/// #[derive(Default)]
/// struct SubscribeTask;
///
/// #[async_trait]
/// impl Task for SubscribeTask {
///     async fn execute(
///         &self,
///         ctx: &TaskContext,
///         payload: Option<&Payload>,
///     ) -> Result<TaskResult, TaskError> {
///         let topic = payload.and_then(|p| p.get_str("topic")).unwrap_or_default();
///         // ...
///         Ok(TaskResult::Success)
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    async fn execute(
        &self,
        ctx: &TaskContext,
        payload: Option<&Payload>,
    ) -> Result<TaskResult, TaskError>;

    /// Called once when a scheduled instance exceeds its retry ceiling, to
    /// report the permanent failure upstream.
    async fn on_retries_exhausted(&self, _ctx: &TaskContext, _payload: Option<&Payload>) {}
}

/// Static description of a task type, consulted by the Task Manager instead
/// of runtime metadata.
pub trait TaskType: Task + Sized {
    /// Stable, globally unique identifier. Must not contain `#`.
    ///
    /// # Naming
    /// - `{namespace}.{domain}.{action}.v{major}`
    /// - e.g. `push.topic.subscribe.v1`
    const TYPE: &'static str;

    /// At most one pending instance; re-scheduling replaces it.
    const SINGLETON: bool = false;

    /// Options applied under any caller overrides. The retry ceiling declared
    /// here is the one enforced when scheduled firings reschedule.
    fn default_options() -> TaskOptions {
        TaskOptions::default()
    }
}

/// What a task sees while it runs.
#[derive(Clone)]
pub struct TaskContext {
    tag: Option<Tag>,
    retry_count: Option<u32>,
    store: Arc<dyn PayloadStore>,
}

impl TaskContext {
    pub(crate) fn new(
        tag: Option<Tag>,
        retry_count: Option<u32>,
        store: Arc<dyn PayloadStore>,
    ) -> Self {
        Self {
            tag,
            retry_count,
            store,
        }
    }

    /// Tag of the scheduled job, if this run came from the backend.
    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// Scheduled firings so far (this one included), if tracked.
    pub fn retry_count(&self) -> Option<u32> {
        self.retry_count
    }

    /// Scalar settings and blobs shared with the rest of the process.
    pub fn store(&self) -> &Arc<dyn PayloadStore> {
        &self.store
    }
}
