//! Append-only event log with cursor-based pull subscriptions.
//!
//! Listeners take a cursor before submitting an input so no event produced
//! by that input can be missed, then pull events one at a time from the
//! cursor. Old events are dropped once the log exceeds its retention.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use {tokio::sync::watch, tracing::warn};

use crate::event::AgentEvent;

const DEFAULT_RETENTION: usize = 1024;

/// Position in an [`EventLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventCursor(u64);

impl EventCursor {
    pub fn offset(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Head {
    end: u64,
    closed: bool,
}

#[derive(Debug)]
struct Entries {
    base: u64,
    events: VecDeque<AgentEvent>,
    retention: usize,
    closed: bool,
}

impl Entries {
    fn end(&self) -> u64 {
        self.base + self.events.len() as u64
    }
}

#[derive(Debug)]
struct Shared {
    entries: Mutex<Entries>,
    head: watch::Sender<Head>,
}

/// Event log shared between an agent and its listeners. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct EventLog {
    shared: Arc<Shared>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        let (head, _) = watch::channel(Head::default());
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(Entries {
                    base: 0,
                    events: VecDeque::new(),
                    retention: retention.max(1),
                    closed: false,
                }),
                head,
            }),
        }
    }

    /// Append an event. Ignored once the log is closed.
    pub fn append(&self, event: AgentEvent) {
        let head = {
            let mut entries = self
                .shared
                .entries
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if entries.closed {
                return;
            }
            entries.events.push_back(event);
            while entries.events.len() > entries.retention {
                entries.events.pop_front();
                entries.base += 1;
            }
            Head {
                end: entries.end(),
                closed: false,
            }
        };
        self.shared.head.send_replace(head);
    }

    /// Mark the log finished. Subscribers drain what is left, then end.
    pub fn close(&self) {
        let head = {
            let mut entries = self
                .shared
                .entries
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            entries.closed = true;
            Head {
                end: entries.end(),
                closed: true,
            }
        };
        self.shared.head.send_replace(head);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.head.borrow().closed
    }

    /// Cursor pointing just past the newest event.
    pub fn cursor(&self) -> EventCursor {
        EventCursor(self.shared.head.borrow().end)
    }

    /// Pull events starting at `from`.
    pub fn subscribe(&self, from: EventCursor) -> EventSubscription {
        EventSubscription {
            shared: Arc::clone(&self.shared),
            head: self.shared.head.subscribe(),
            position: from.0,
        }
    }
}

/// A listener's read position in an [`EventLog`].
#[derive(Debug)]
pub struct EventSubscription {
    shared: Arc<Shared>,
    head: watch::Receiver<Head>,
    position: u64,
}

impl EventSubscription {
    /// Next event after the current position, waiting for one to be
    /// appended. Returns `None` once the log is closed and drained.
    pub async fn next(&mut self) -> Option<AgentEvent> {
        loop {
            self.head.borrow_and_update();
            {
                let entries = self
                    .shared
                    .entries
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                if self.position < entries.base {
                    warn!(
                        skipped = entries.base - self.position,
                        "subscriber fell behind log retention"
                    );
                    self.position = entries.base;
                }
                let index = (self.position - entries.base) as usize;
                if let Some(event) = entries.events.get(index) {
                    self.position += 1;
                    return Some(event.clone());
                }
                if entries.closed {
                    return None;
                }
            }
            if self.head.changed().await.is_err() {
                return None;
            }
        }
    }

    pub fn position(&self) -> EventCursor {
        EventCursor(self.position)
    }
}
