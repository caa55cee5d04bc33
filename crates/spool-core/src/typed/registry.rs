//! TaskRegistry - the closed set of task types the Task Manager can run.
//!
//! Populated once at startup. A tag naming a type that is not registered is
//! a data error, not a loading error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::task::{Task, TaskType};
use crate::domain::{TaskOptions, TAG_SEPARATOR};
use crate::error::TaskError;

/// Builds a fresh task instance for one execution.
pub type TaskFactory = Arc<dyn Fn() -> Result<Box<dyn Task>, TaskError> + Send + Sync>;

/// Declarative description of a registered task type.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub type_id: String,
    pub singleton: bool,
    pub default_options: TaskOptions,
}

impl TaskDescriptor {
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            singleton: false,
            default_options: TaskOptions::default(),
        }
    }

    pub fn of<T: TaskType>() -> Self {
        Self {
            type_id: T::TYPE.to_string(),
            singleton: T::SINGLETON,
            default_options: T::default_options(),
        }
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    pub fn default_options(mut self, options: TaskOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Declared retry ceiling; `0` means none.
    pub fn retry_ceiling(&self) -> u32 {
        self.default_options.retry_ceiling()
    }

    /// Deterministic payload key for singleton instances of this type.
    pub fn singleton_data_key(&self) -> &str {
        &self.type_id
    }
}

/// A descriptor plus the factory that builds its task.
#[derive(Clone)]
pub struct RegisteredTask {
    descriptor: TaskDescriptor,
    factory: TaskFactory,
}

impl RegisteredTask {
    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    pub fn instantiate(&self) -> Result<Box<dyn Task>, TaskError> {
        (self.factory)()
    }
}

impl fmt::Debug for RegisteredTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTask")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// RegistryError は TaskRegistry の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("task type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("task type '{0}' is empty or contains the tag separator")]
    InvalidTypeId(String),
}

#[derive(Default, Clone)]
pub struct TaskRegistry {
    tasks: HashMap<String, RegisteredTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    /// Register a task type built with `Default` for every execution.
    pub fn register<T: TaskType + Default>(&mut self) -> Result<(), RegistryError> {
        self.register_factory::<T, _>(|| Ok(T::default()))
    }

    /// Register a task type with a fallible constructor.
    pub fn register_factory<T, F>(&mut self, factory: F) -> Result<(), RegistryError>
    where
        T: TaskType,
        F: Fn() -> Result<T, TaskError> + Send + Sync + 'static,
    {
        self.register_with(TaskDescriptor::of::<T>(), move || {
            factory().map(|task| Box::new(task) as Box<dyn Task>)
        })
    }

    /// Register a hand-written descriptor with a type-erased factory.
    pub fn register_with<F>(
        &mut self,
        descriptor: TaskDescriptor,
        factory: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn() -> Result<Box<dyn Task>, TaskError> + Send + Sync + 'static,
    {
        let type_id = descriptor.type_id.clone();
        if type_id.is_empty() || type_id.contains(TAG_SEPARATOR) {
            return Err(RegistryError::InvalidTypeId(type_id));
        }
        if self.tasks.contains_key(&type_id) {
            return Err(RegistryError::AlreadyRegistered(type_id));
        }
        self.tasks.insert(
            type_id,
            RegisteredTask {
                descriptor,
                factory: Arc::new(factory),
            },
        );
        Ok(())
    }

    pub fn get(&self, type_id: &str) -> Option<&RegisteredTask> {
        self.tasks.get(type_id)
    }

    pub fn descriptor(&self, type_id: &str) -> Option<&TaskDescriptor> {
        self.tasks.get(type_id).map(RegisteredTask::descriptor)
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.tasks.contains_key(type_id)
    }

    /// Registered type identifiers, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.tasks.keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::task::fixtures::{Broken, Panicky};

    #[test]
    fn test_register_and_get() {
        let mut registry = TaskRegistry::new();
        registry.register::<Broken>().unwrap();

        let entry = registry.get(Broken::TYPE).unwrap();
        assert_eq!(entry.descriptor().type_id, Broken::TYPE);
        assert!(!entry.descriptor().singleton);
        assert!(entry.instantiate().is_ok());
    }

    #[test]
    fn test_double_registration() {
        let mut registry = TaskRegistry::new();
        registry.register::<Broken>().unwrap();
        let result = registry.register::<Broken>();
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
    }

    #[test]
    fn test_registered_types_are_sorted() {
        let mut registry = TaskRegistry::new();
        registry.register::<Panicky>().unwrap();
        registry.register::<Broken>().unwrap();
        assert_eq!(
            registry.registered_types(),
            vec![Broken::TYPE.to_string(), Panicky::TYPE.to_string()]
        );
    }

    #[test]
    fn test_separator_in_type_id_is_rejected() {
        let mut registry = TaskRegistry::new();
        let result = registry.register_with(TaskDescriptor::new("bad#type"), || {
            Ok(Box::new(Broken) as Box<dyn Task>)
        });
        assert!(matches!(result, Err(RegistryError::InvalidTypeId(_))));

        let result = registry.register_with(TaskDescriptor::new(""), || {
            Ok(Box::new(Broken) as Box<dyn Task>)
        });
        assert!(matches!(result, Err(RegistryError::InvalidTypeId(_))));
    }

    #[test]
    fn test_failing_factory_surfaces_error() {
        let mut registry = TaskRegistry::new();
        registry
            .register_factory::<Broken, _>(|| Err(TaskError::new("no credentials")))
            .unwrap();
        let err = registry.get(Broken::TYPE).unwrap().instantiate().err().unwrap();
        assert!(err.to_string().contains("no credentials"));
    }

    #[test]
    fn test_singleton_data_key_is_type_id() {
        let descriptor = TaskDescriptor::new("push.register.v1").singleton(true);
        assert_eq!(descriptor.singleton_data_key(), "push.register.v1");
    }
}
