//! App - アプリケーション層
//!
//! ports を組み合わせて Task Manager を組み立てる。
//!
//! # 主要コンポーネント
//! - **TaskManagerBuilder**: 構築とワイヤリング（Fail-fast 検証）
//! - **TaskManager**: schedule / cancel / run_async / handle_scheduled_task
//! - **WorkerLoop**: FIFO のバックグラウンド実行ループ
//! - **SpoolConfig**: TOML 設定

pub mod builder;
pub mod config;
pub mod manager;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, TaskManagerBuilder};
pub use self::config::SpoolConfig;
pub use self::manager::TaskManager;
pub use self::worker_loop::{Job, WorkerHandle, WorkerLoop};
