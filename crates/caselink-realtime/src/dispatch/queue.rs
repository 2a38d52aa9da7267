//! Debounce queue with last-write-wins coalescing.

use chrono::{DateTime, Utc};

use caselink_core::events::{EventKind, SyncEvent};

/// An event waiting for the debounce window to close.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    /// The event.
    pub event: SyncEvent,
    /// When it was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

/// Events enqueued during the current debounce window.
#[derive(Debug, Default)]
pub struct DebounceQueue {
    events: Vec<QueuedEvent>,
}

impl DebounceQueue {
    /// Appends an event.
    pub fn push(&mut self, event: SyncEvent) {
        self.events.push(QueuedEvent {
            event,
            enqueued_at: Utc::now(),
        });
    }

    /// Number of queued events, before coalescing.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Empties the queue, keeping only the most recently enqueued event of
    /// each kind. Kinds come out in order of first appearance.
    pub fn drain_coalesced(&mut self) -> Vec<QueuedEvent> {
        let mut latest: Vec<(EventKind, QueuedEvent)> = Vec::new();
        for queued in self.events.drain(..) {
            let kind = queued.event.kind();
            match latest.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, slot)) => *slot = queued,
                None => latest.push((kind, queued)),
            }
        }
        latest.into_iter().map(|(_, queued)| queued).collect()
    }
}
