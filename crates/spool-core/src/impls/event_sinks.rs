//! EventSink implementations: record in memory, or forward to a channel.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::domain::{TaskEvent, TaskEventKind};
use crate::ports::EventSink;

/// Keeps every event in order. Meant for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<TaskEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn kinds(&self) -> Vec<TaskEventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    pub fn failures(&self) -> Vec<TaskEvent> {
        self.events().into_iter().filter(TaskEvent::is_failure).collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Forwards events to an unbounded channel; dropped once the receiver is
/// gone.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: TaskEvent) {
        // receiver may already be dropped
        let _ = self.tx.send(event);
    }
}
