//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryPayloadStore** / **JsonFileStore**: PayloadStore
//! - **InMemoryBackend**: SchedulingBackend（バックオフ付き）
//! - **RecordingEventSink** / **ChannelEventSink**: EventSink
//!
//! Platform job triggers and production key-value engines live outside
//! this crate; they only need to implement the ports.

pub mod event_sinks;
pub mod file_store;
pub mod inmem_backend;
pub mod inmem_store;
pub mod retry;

// 主要な型を再エクスポート
pub use self::event_sinks::{ChannelEventSink, RecordingEventSink};
pub use self::file_store::JsonFileStore;
pub use self::inmem_backend::InMemoryBackend;
pub use self::inmem_store::InMemoryPayloadStore;
pub use self::retry::RetryPolicy;
