//! EventSink port - observer for failures the Task Manager swallows
//!
//! Callers never see scheduling errors as return values. Anything that went
//! wrong on a fire-and-forget path is logged and also emitted here, so
//! tests and hosts can assert on it instead of scraping logs.

use crate::domain::TaskEvent;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: TaskEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: TaskEvent) {}
}
