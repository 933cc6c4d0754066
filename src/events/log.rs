//! Append-only event log.

use crate::types::{Event, EventInput, Timestamp};

/// Append-only, ordered sequence of events for one session.
///
/// The log itself is not synchronized; the registry entry that owns it
/// guards it together with the session state.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log holding already-stored events, kept in the given order.
    pub fn from_events(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Append an event, assigning its id and timestamp if absent.
    ///
    /// Returns the stored event.
    pub fn append(&mut self, input: EventInput) -> Event {
        let event = input.into_event();
        self.events.push(event.clone());
        event
    }

    /// Full history, oldest first.
    pub fn list(&self) -> Vec<Event> {
        self.events.clone()
    }

    /// The last `count` events, oldest first.
    pub fn recent(&self, count: usize) -> Vec<Event> {
        let start = self.events.len().saturating_sub(count);
        self.events[start..].to_vec()
    }

    /// Events with a timestamp at or after `after`, oldest first.
    pub fn since(&self, after: Timestamp) -> Vec<Event> {
        self.events
            .iter()
            .filter(|event| event.timestamp >= after)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }
}
