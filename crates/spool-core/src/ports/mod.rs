//! Ports - 抽象化レイヤー
//!
//! Everything the Task Manager consumes from the outside world sits behind
//! one of these traits: the payload store, the scheduling backend, the
//! event observer, the clock and the data-key generator.

pub mod backend;
pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod payload_store;

// 主要な trait を再エクスポート
pub use self::backend::{ScheduledTaskHandler, SchedulingBackend};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::id_generator::{DataKeyGenerator, SequentialKeyGenerator, UlidKeyGenerator};
pub use self::payload_store::{PayloadStore, StoredValue};
