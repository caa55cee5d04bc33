//! spool-core
//!
//! Durable task scheduling with bounded retries.
//!
//! # モジュール構成
//! - **domain**: タグ、オプション、ペイロード、結果、イベント
//! - **ports**: 抽象化レイヤー（PayloadStore, SchedulingBackend, EventSink, ...）
//! - **typed**: Task trait, TaskType 記述子, TaskRegistry
//! - **app**: TaskManager, TaskManagerBuilder, WorkerLoop, SpoolConfig
//! - **impls**: 開発用の実装（InMemoryBackend, JsonFileStore, ...）
//! - **error**: エラー型

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod typed;

pub use app::{BuildError, SpoolConfig, TaskManager, TaskManagerBuilder};
pub use domain::{Payload, Tag, TaskOptions, TaskResult};
pub use error::{SpoolError, TaskError};
pub use typed::{Task, TaskContext, TaskType};
