//! TaskManager - スケジュール・実行・リトライ管理
//!
//! The only stateful coordinator. It resolves task identity, persists
//! payloads, drives the scheduling backend, runs immediate work on its
//! background worker, and applies the retry-ceiling state machine when the
//! backend fires a tag.
//!
//! # Scheduled firing
//! ```text
//! PENDING -> EXECUTING -> SUCCESS                 payload deleted
//!                      -> FAIL                    payload kept until the ceiling is passed
//!                      -> RESCHEDULE -> PENDING   payload persisted with its new retry_count
//!                      -> RESCHEDULE past ceiling -> FAIL, payload deleted, hook called
//! ```
//!
//! Nothing here re-schedules on its own; the verdict goes back to the
//! backend, which owns the backoff.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::worker_loop::WorkerHandle;
use crate::domain::tag as codec;
use crate::domain::{Payload, Tag, TaskEvent, TaskEventKind, TaskIdentity, TaskOptions, TaskResult};
use crate::error::{SpoolError, TagError};
use crate::ports::{
    DataKeyGenerator, EventSink, PayloadStore, ScheduledTaskHandler, SchedulingBackend,
};
use crate::typed::{RegisteredTask, Task, TaskContext, TaskRegistry, TaskType};

/// Per-data-key async locks. Held around each read-modify-write of a
/// payload, never across task execution.
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    async fn lock(&self, data_key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // drop entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(data_key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub(crate) struct Inner {
    pub(crate) registry: TaskRegistry,
    pub(crate) store: Arc<dyn PayloadStore>,
    pub(crate) backend: Arc<dyn SchedulingBackend>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) keys: Arc<dyn DataKeyGenerator>,
    pub(crate) worker: WorkerHandle,
    locks: KeyLocks,
}

impl Inner {
    pub(crate) fn new(
        registry: TaskRegistry,
        store: Arc<dyn PayloadStore>,
        backend: Arc<dyn SchedulingBackend>,
        events: Arc<dyn EventSink>,
        keys: Arc<dyn DataKeyGenerator>,
        worker: WorkerHandle,
    ) -> Self {
        Self {
            registry,
            store,
            backend,
            events,
            keys,
            worker,
            locks: KeyLocks::default(),
        }
    }
}

/// Handle to the task subsystem. Clones share one worker, one store and one
/// backend. Build it with [`TaskManagerBuilder`](super::TaskManagerBuilder).
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    pub(crate) fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &Arc<dyn PayloadStore> {
        &self.inner.store
    }

    fn emit(&self, kind: TaskEventKind) {
        self.inner.events.emit(TaskEvent::now(kind));
    }

    // ---------------------------------------------------------------
    // scheduling path
    // ---------------------------------------------------------------

    /// Schedule `T` through the backend. See [`schedule_task_by_id`](Self::schedule_task_by_id).
    pub async fn schedule_task<T: TaskType>(
        &self,
        payload: Option<Payload>,
        options: Option<TaskOptions>,
    ) {
        self.schedule_task_by_id(T::TYPE, payload, options).await;
    }

    /// Persist `payload` (if any) and hand the task's tag to the backend.
    ///
    /// Options are the type's defaults overlaid with whatever `options` set
    /// explicitly; singletons always replace their pending job. Failures are
    /// logged and reported to the event sink, never returned.
    pub async fn schedule_task_by_id(
        &self,
        type_id: &str,
        payload: Option<Payload>,
        options: Option<TaskOptions>,
    ) {
        let Some(entry) = self.inner.registry.get(type_id) else {
            tracing::warn!(type_id, "cannot schedule unregistered task type");
            self.emit(TaskEventKind::UnknownTaskType {
                type_id: type_id.to_string(),
            });
            return;
        };
        let descriptor = entry.descriptor();

        let mut builder = TaskOptions::builder().defaults(descriptor.default_options);
        if let Some(options) = &options {
            builder = builder.update(options);
        }
        if descriptor.singleton {
            builder = builder.replace(true);
        }
        let options = builder.build();

        let data_key = if descriptor.singleton {
            Some(descriptor.singleton_data_key().to_string())
        } else if payload.is_some() {
            Some(self.inner.keys.generate())
        } else {
            None
        };

        if let (Some(data_key), Some(payload)) = (&data_key, &payload) {
            let _guard = self.inner.locks.lock(data_key).await;
            if !self.persist_payload(data_key, payload).await {
                tracing::error!(type_id, data_key, "payload not stored; task not scheduled");
                return;
            }
        }

        let tag = codec::encode(type_id, data_key.as_deref());
        match self.inner.backend.schedule(&tag, &options).await {
            Ok(()) => {
                tracing::debug!(type_id, %tag, delay = ?options.delay(), "scheduled task");
                self.emit(TaskEventKind::Scheduled {
                    type_id: type_id.to_string(),
                    tag,
                });
            }
            Err(e) => {
                tracing::error!(type_id, %tag, error = %e, "backend rejected schedule");
                self.emit(TaskEventKind::BackendFailed {
                    tag,
                    reason: e.to_string(),
                });
            }
        }
    }

    pub async fn cancel_task<T: TaskType>(&self) -> Result<(), SpoolError> {
        self.cancel_task_by_id(T::TYPE).await
    }

    /// Cancel the pending job of a singleton task type and drop its payload.
    ///
    /// Non-singleton types have no deterministic tag to cancel, so asking is
    /// an `InvalidArgument` error. Backend failures are logged and reported,
    /// not returned.
    pub async fn cancel_task_by_id(&self, type_id: &str) -> Result<(), SpoolError> {
        let descriptor = self
            .inner
            .registry
            .descriptor(type_id)
            .ok_or_else(|| SpoolError::UnknownTaskType(type_id.to_string()))?;
        if !descriptor.singleton {
            return Err(SpoolError::InvalidArgument(format!(
                "cannot cancel non-singleton task type '{type_id}'"
            )));
        }

        let data_key = descriptor.singleton_data_key();
        let tag = codec::encode(type_id, Some(data_key));
        match self.inner.backend.cancel(&tag).await {
            Ok(()) => {
                tracing::debug!(%tag, "cancelled task");
                self.emit(TaskEventKind::Cancelled { tag });
            }
            Err(e) => {
                tracing::error!(%tag, error = %e, "backend rejected cancel");
                self.emit(TaskEventKind::BackendFailed {
                    tag,
                    reason: e.to_string(),
                });
            }
        }

        let _guard = self.inner.locks.lock(data_key).await;
        self.delete_payload(data_key).await;
        Ok(())
    }

    // ---------------------------------------------------------------
    // background worker
    // ---------------------------------------------------------------

    /// Run `task` on the background worker after everything already queued.
    /// Returns immediately.
    pub fn run_async<T: Task>(&self, task: T, payload: Option<Payload>) {
        let label = std::any::type_name::<T>();
        let job = self.background_job(label, Arc::new(task), payload);
        self.inner.worker.post(label, job);
    }

    /// Run `task` on the background worker no earlier than `delay` from now.
    pub fn run_async_delayed<T: Task>(&self, task: T, delay: Duration) {
        let label = std::any::type_name::<T>();
        let job = self.background_job(label, Arc::new(task), None);
        self.inner.worker.post_delayed(label, delay, job);
    }

    fn background_job(
        &self,
        label: &'static str,
        task: Arc<dyn Task>,
        payload: Option<Payload>,
    ) -> super::worker_loop::Job {
        let ctx = TaskContext::new(None, None, self.inner.store.clone());
        let events = self.inner.events.clone();
        Box::pin(async move {
            match execute_isolated(task, ctx, payload).await {
                Ok(result) => tracing::debug!(task = label, %result, "background task finished"),
                Err(reason) => {
                    tracing::error!(task = label, %reason, "background task failed");
                    events.emit(TaskEvent::now(TaskEventKind::ExecutionFailed {
                        type_id: label.to_string(),
                        reason,
                    }));
                }
            }
        })
    }

    // ---------------------------------------------------------------
    // direct dispatch
    // ---------------------------------------------------------------

    /// Build and run a registered task right here, bypassing tag, store and
    /// backend. Returns the verdict if the task ran to completion.
    pub async fn handle_async_task(
        &self,
        type_id: &str,
        payload: Option<Payload>,
    ) -> Option<TaskResult> {
        let Some(entry) = self.inner.registry.get(type_id) else {
            tracing::warn!(type_id, "cannot run unregistered task type");
            self.emit(TaskEventKind::UnknownTaskType {
                type_id: type_id.to_string(),
            });
            return None;
        };
        let task = self.instantiate(entry)?;

        let ctx = TaskContext::new(None, None, self.inner.store.clone());
        match execute_isolated(task, ctx, payload).await {
            Ok(result) => {
                tracing::debug!(type_id, %result, "async task finished");
                Some(result)
            }
            Err(reason) => {
                tracing::error!(type_id, %reason, "async task failed");
                self.emit(TaskEventKind::ExecutionFailed {
                    type_id: type_id.to_string(),
                    reason,
                });
                None
            }
        }
    }

    // ---------------------------------------------------------------
    // scheduled firing
    // ---------------------------------------------------------------

    /// Run the task behind `tag` and tell the backend what to do next.
    pub async fn handle_scheduled_task(&self, tag: &Tag) -> TaskResult {
        tracing::debug!(%tag, "scheduled task fired");

        let (identity, entry) = match self.resolve(tag) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(%tag, error = %e, "invalid task tag");
                self.emit(TaskEventKind::MalformedTag {
                    tag: tag.clone(),
                    reason: e.to_string(),
                });
                return TaskResult::Fail;
            }
        };

        let Some(task) = self.instantiate(entry) else {
            return TaskResult::Fail;
        };

        // Claim this firing's retry count under the key lock. The lock is
        // released before the task runs so the task may schedule or cancel
        // its own tag.
        let mut payload = None;
        let mut claimed = None;
        if let Some(data_key) = &identity.data_key {
            let _guard = self.inner.locks.lock(data_key).await;
            payload = self.load_payload(data_key).await;
            if let Some(payload) = payload.as_mut() {
                payload.increment_retry_count();
                claimed = self.claim_payload(data_key, payload).await;
            }
        }

        let retry_count = payload.as_ref().map(Payload::retry_count);
        let ctx = TaskContext::new(Some(tag.clone()), retry_count, self.inner.store.clone());

        let mut result = match execute_isolated(task.clone(), ctx.clone(), payload.clone()).await {
            Ok(result) => result,
            Err(reason) => {
                tracing::error!(%tag, %reason, "task execution failed");
                self.emit(TaskEventKind::ExecutionFailed {
                    type_id: identity.type_id.clone(),
                    reason,
                });
                TaskResult::Fail
            }
        };

        if let (Some(data_key), Some(payload), Some(count)) =
            (&identity.data_key, &payload, retry_count)
        {
            let ceiling = entry.descriptor().retry_ceiling();
            let exceeded = ceiling > 0 && count > ceiling;

            let guard = self.inner.locks.lock(data_key).await;
            // a newer schedule, cancel or firing owns the key now
            let superseded = !self.still_claimed(data_key, claimed.as_deref()).await;
            if superseded {
                tracing::debug!(%tag, "payload changed while the task ran; leaving it");
            }

            result = match result {
                TaskResult::Success => {
                    if !superseded {
                        self.delete_payload(data_key).await;
                    }
                    TaskResult::Success
                }
                TaskResult::Reschedule if exceeded => {
                    tracing::warn!(
                        %tag,
                        retries = count,
                        ceiling,
                        "task failed too many times, aborting"
                    );
                    if !superseded {
                        self.delete_payload(data_key).await;
                    }
                    drop(guard);
                    notify_exhausted(task, ctx, payload.clone()).await;
                    self.emit(TaskEventKind::RetriesExhausted {
                        tag: tag.clone(),
                        retry_count: count,
                        ceiling,
                    });
                    TaskResult::Fail
                }
                TaskResult::Reschedule => {
                    tracing::warn!(%tag, attempt = count, "task attempt failed, rescheduling");
                    if !superseded && claimed.is_none() {
                        self.persist_payload(data_key, payload).await;
                    }
                    TaskResult::Reschedule
                }
                TaskResult::Fail if exceeded => {
                    if !superseded {
                        self.delete_payload(data_key).await;
                    }
                    TaskResult::Fail
                }
                TaskResult::Fail => {
                    if !superseded && claimed.is_none() {
                        self.persist_payload(data_key, payload).await;
                    }
                    TaskResult::Fail
                }
            };
        }

        tracing::debug!(%tag, %result, retry_count, "scheduled task finished");
        self.emit(TaskEventKind::Fired {
            tag: tag.clone(),
            result,
            retry_count,
        });
        result
    }

    fn resolve<'a>(&'a self, tag: &Tag) -> Result<(TaskIdentity, &'a RegisteredTask), TagError> {
        let identity = codec::decode(tag)?;
        let entry = self
            .inner
            .registry
            .get(&identity.type_id)
            .ok_or_else(|| TagError::UnknownType(tag.clone(), identity.type_id.clone()))?;
        Ok((identity, entry))
    }

    fn instantiate(&self, entry: &RegisteredTask) -> Option<Arc<dyn Task>> {
        match entry.instantiate() {
            Ok(task) => Some(Arc::from(task)),
            Err(e) => {
                let type_id = entry.descriptor().type_id.clone();
                tracing::error!(%type_id, error = %e, "creating task instance failed");
                self.emit(TaskEventKind::InstantiationFailed {
                    type_id,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    // ---------------------------------------------------------------
    // payload store
    // ---------------------------------------------------------------

    async fn load_payload(&self, data_key: &str) -> Option<Payload> {
        match self.inner.store.get_blob(data_key).await {
            Ok(Some(bytes)) => match Payload::from_bytes(&bytes) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!(
                        data_key,
                        error = %e,
                        "stored payload is unreadable; running without it"
                    );
                    self.emit(TaskEventKind::PayloadCorrupt {
                        data_key: data_key.to_string(),
                        reason: e.to_string(),
                    });
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::error!(data_key, error = %e, "loading payload failed");
                self.emit(TaskEventKind::StoreFailed {
                    data_key: data_key.to_string(),
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    /// Store the incremented payload and return the bytes now held under
    /// `data_key`, or `None` if the write failed.
    async fn claim_payload(&self, data_key: &str, payload: &Payload) -> Option<Vec<u8>> {
        let bytes = match payload.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(data_key, error = %e, "encoding payload failed");
                return None;
            }
        };
        self.persist_bytes(data_key, bytes.clone()).await.then_some(bytes)
    }

    /// Does `data_key` still hold what this firing wrote? With no claim
    /// (the write failed) the key counts as untouched.
    async fn still_claimed(&self, data_key: &str, claimed: Option<&[u8]>) -> bool {
        let Some(claimed) = claimed else {
            return true;
        };
        match self.inner.store.get_blob(data_key).await {
            Ok(current) => current.as_deref() == Some(claimed),
            Err(e) => {
                tracing::error!(data_key, error = %e, "re-reading payload failed");
                self.emit(TaskEventKind::StoreFailed {
                    data_key: data_key.to_string(),
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    async fn persist_payload(&self, data_key: &str, payload: &Payload) -> bool {
        match payload.to_bytes() {
            Ok(bytes) => self.persist_bytes(data_key, bytes).await,
            Err(e) => {
                tracing::error!(data_key, error = %e, "encoding payload failed");
                self.emit(TaskEventKind::StoreFailed {
                    data_key: data_key.to_string(),
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    async fn persist_bytes(&self, data_key: &str, bytes: Vec<u8>) -> bool {
        match self.inner.store.put_blob(data_key, bytes).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(data_key, error = %e, "storing payload failed");
                self.emit(TaskEventKind::StoreFailed {
                    data_key: data_key.to_string(),
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    async fn delete_payload(&self, data_key: &str) {
        if let Err(e) = self.inner.store.delete(data_key).await {
            tracing::error!(data_key, error = %e, "deleting payload failed");
            self.emit(TaskEventKind::StoreFailed {
                data_key: data_key.to_string(),
                reason: e.to_string(),
            });
        }
    }
}

#[async_trait]
impl ScheduledTaskHandler for TaskManager {
    async fn handle_scheduled_task(&self, tag: &Tag) -> TaskResult {
        TaskManager::handle_scheduled_task(self, tag).await
    }
}

/// Run the task on its own tokio task so a panic surfaces as an error.
async fn execute_isolated(
    task: Arc<dyn Task>,
    ctx: TaskContext,
    payload: Option<Payload>,
) -> Result<TaskResult, String> {
    let joined = tokio::spawn(async move { task.execute(&ctx, payload.as_ref()).await }).await;
    match joined {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) if e.is_panic() => Err(format!("panicked: {}", panic_message(e.into_panic()))),
        Err(e) => Err(e.to_string()),
    }
}

async fn notify_exhausted(task: Arc<dyn Task>, ctx: TaskContext, payload: Payload) {
    let joined = tokio::spawn(async move {
        task.on_retries_exhausted(&ctx, Some(&payload)).await;
    })
    .await;
    if let Err(e) = joined {
        tracing::error!(error = %e, "retries-exhausted hook failed");
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
