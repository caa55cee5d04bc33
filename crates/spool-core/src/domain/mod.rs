//! Domain model (tags, options, payloads, outcomes, events).

pub mod events;
pub mod options;
pub mod outcome;
pub mod payload;
pub mod tag;

pub use events::{TaskEvent, TaskEventKind};
pub use options::{TaskOptions, TaskOptionsBuilder};
pub use outcome::TaskResult;
pub use payload::{Payload, RETRY_COUNT_FIELD};
pub use tag::{Tag, TaskIdentity, TAG_SEPARATOR};
