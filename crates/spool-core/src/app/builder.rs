//! TaskManagerBuilder - TaskManager の構築とワイヤリング
//!
//! Wires the registry, the payload store, the scheduling backend and the
//! optional collaborators into a [`TaskManager`], and spawns its background
//! worker on the current tokio runtime.
//!
//! Start-up checks fail fast: a missing store or backend, a missing runtime,
//! or a task type listed in `expect_tasks` but never registered.

use std::sync::Arc;

use tokio::runtime::Handle;

use super::manager::{Inner, TaskManager};
use super::worker_loop::WorkerLoop;
use crate::ports::{
    DataKeyGenerator, EventSink, NoopEventSink, PayloadStore, SchedulingBackend, SystemClock,
    UlidKeyGenerator,
};
use crate::typed::{RegistryError, TaskRegistry, TaskType};

/// # 使用例
/// ```ignore
/// let manager = TaskManagerBuilder::new()
///     .register::<SubscribeTask>()?
///     .store(store)
///     .backend(backend.clone())
///     .expect_tasks(&[SubscribeTask::TYPE])
///     .build()?;
/// ```
#[derive(Default)]
pub struct TaskManagerBuilder {
    registry: TaskRegistry,
    store: Option<Arc<dyn PayloadStore>>,
    backend: Option<Arc<dyn SchedulingBackend>>,
    events: Option<Arc<dyn EventSink>>,
    keys: Option<Arc<dyn DataKeyGenerator>>,
    expected_tasks: Option<Vec<String>>,
}

/// BuildError は TaskManager 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task types: {0:?}. These tasks were expected but not registered.")]
    MissingTaskTypes(Vec<String>),

    #[error("no payload store configured")]
    MissingStore,

    #[error("no scheduling backend configured")]
    MissingBackend,

    #[error("TaskManager must be built inside a tokio runtime")]
    NoRuntime,
}

impl TaskManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task type built with `Default`.
    pub fn register<T: TaskType + Default>(mut self) -> Result<Self, RegistryError> {
        self.registry.register::<T>()?;
        Ok(self)
    }

    /// Replace the registry wholesale, e.g. one populated with hand-written
    /// descriptors.
    pub fn registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn store(mut self, store: Arc<dyn PayloadStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn SchedulingBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Observer for swallowed failures. Defaults to dropping them.
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Source of non-singleton data keys. Defaults to ULIDs.
    pub fn key_generator(mut self, keys: Arc<dyn DataKeyGenerator>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// 期待される task_type のリストを設定
    pub fn expect_tasks(mut self, task_types: &[&str]) -> Self {
        self.expected_tasks = Some(task_types.iter().map(|t| t.to_string()).collect());
        self
    }

    /// # 検証
    /// - expect_tasks() の task_type が全て登録されているか
    /// - store と backend が設定されているか
    /// - tokio runtime の中で呼ばれているか
    pub fn build(self) -> Result<TaskManager, BuildError> {
        if let Some(expected_tasks) = &self.expected_tasks {
            let missing_tasks: Vec<String> = expected_tasks
                .iter()
                .filter(|t| !self.registry.contains(t))
                .cloned()
                .collect();
            if !missing_tasks.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing_tasks));
            }
        }

        let store = self.store.ok_or(BuildError::MissingStore)?;
        let backend = self.backend.ok_or(BuildError::MissingBackend)?;
        let runtime = Handle::try_current().map_err(|_| BuildError::NoRuntime)?;

        let events = self.events.unwrap_or_else(|| Arc::new(NoopEventSink));
        let keys = self
            .keys
            .unwrap_or_else(|| Arc::new(UlidKeyGenerator::new(SystemClock)));

        let (worker, _join) = WorkerLoop::spawn(&runtime);
        tracing::debug!(
            task_types = ?self.registry.registered_types(),
            "task manager ready"
        );

        Ok(TaskManager::from_inner(Inner::new(
            self.registry,
            store,
            backend,
            events,
            keys,
            worker,
        )))
    }
}
