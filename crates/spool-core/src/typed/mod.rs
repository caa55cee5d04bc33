//! Typed - 型付き Task API
//!
//! Task types declare their identifier, singleton flag and default options
//! statically (`TaskType`); the registry erases them to `Box<dyn Task>`
//! factories keyed by identifier.

pub mod registry;
pub mod task;

pub use self::registry::{RegisteredTask, RegistryError, TaskDescriptor, TaskFactory, TaskRegistry};
pub use self::task::{Task, TaskContext, TaskType};
