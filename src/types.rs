//! Core types for the session store.

use crate::error::Result;
use crate::state::{State, StateDelta};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time. A clock set before the epoch reads as the epoch.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(micros_since_epoch)
            .unwrap_or(0);
        Timestamp(micros)
    }

    pub fn from_secs(secs: i64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Saturates at `i64::MAX` instead of wrapping.
fn micros_since_epoch(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX)
}

/// Generate an identifier for a session or event.
pub(crate) fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Actions attached to an event. Only the state delta is interpreted by the
/// store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    #[serde(default)]
    pub state_delta: StateDelta,
}

/// An event recorded in a session's log.
///
/// Events are immutable once stored; every copy handed out is an owned
/// snapshot that stays valid after its session is deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier (generated if the input had none).
    pub id: String,

    /// Agent invocation that produced this event.
    pub invocation_id: Option<String>,

    /// Who produced the event (e.g. "user" or an agent name).
    pub author: String,

    /// When the event happened (assigned at append if the input had none).
    pub timestamp: Timestamp,

    /// Opaque application payload.
    pub content: Option<Value>,

    pub actions: EventActions,

    /// Streaming fragment; never recorded in the log.
    pub partial: bool,
}

impl Event {
    pub fn state_delta(&self) -> &StateDelta {
        &self.actions.state_delta
    }
}

/// Input for appending an event (before id and timestamp are assigned).
#[derive(Clone, Debug, Default)]
pub struct EventInput {
    pub id: Option<String>,
    pub invocation_id: Option<String>,
    pub author: String,
    pub timestamp: Option<Timestamp>,
    pub content: Option<Value>,
    pub actions: EventActions,
    pub partial: bool,
}

impl EventInput {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            ..Default::default()
        }
    }

    /// Create an event input whose content is `payload` encoded as JSON.
    pub fn json_content(author: impl Into<String>, payload: &impl Serialize) -> Result<Self> {
        Ok(Self::new(author).with_content(serde_json::to_value(payload)?))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_invocation_id(mut self, invocation_id: impl Into<String>) -> Self {
        self.invocation_id = Some(invocation_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_state_delta(mut self, delta: StateDelta) -> Self {
        self.actions.state_delta = delta;
        self
    }

    /// Mark as a streaming fragment.
    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    /// Fill in the id and timestamp and freeze the event.
    pub(crate) fn into_event(self) -> Event {
        Event {
            id: self.id.unwrap_or_else(generate_id),
            invocation_id: self.invocation_id,
            author: self.author,
            timestamp: self.timestamp.unwrap_or_else(Timestamp::now),
            content: self.content,
            actions: self.actions,
            partial: self.partial,
        }
    }
}

/// A conversational session scoped to one application and user.
///
/// A `Session` handed out by the service is a snapshot owned by the caller.
/// The live copy stays inside the service's registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub app_name: String,
    pub user_id: String,
    pub id: String,
    pub state: State,

    /// Events in this snapshot, oldest first. May be a filtered view.
    pub events: Vec<Event>,

    pub last_update_time: Timestamp,

    /// Registry incarnation this snapshot was read from; `None` for sessions
    /// built outside the service.
    #[serde(skip)]
    pub(crate) incarnation: Option<u64>,
}

impl Session {
    /// A session that is not tracked by any service.
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            id: id.into(),
            state: State::new(),
            events: Vec::new(),
            last_update_time: Timestamp::now(),
            incarnation: None,
        }
    }

    pub fn with_state(mut self, state: HashMap<String, Value>) -> Self {
        self.state = State::from(state);
        self
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            app_name: self.app_name.clone(),
            user_id: self.user_id.clone(),
            id: self.id.clone(),
            last_update_time: self.last_update_time,
            event_count: self.events.len(),
        }
    }
}

/// Session metadata without state or events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub app_name: String,
    pub user_id: String,
    pub id: String,
    pub last_update_time: Timestamp,
    pub event_count: usize,
}

/// Options narrowing the events returned by `get_session`.
///
/// State is never filtered; only the `events` of the returned snapshot are.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GetSessionConfig {
    /// Keep only the last N events. Takes precedence over `after_timestamp`.
    pub num_recent_events: Option<usize>,

    /// Keep only events at or after this time.
    pub after_timestamp: Option<Timestamp>,
}

impl GetSessionConfig {
    pub fn recent(count: usize) -> Self {
        Self {
            num_recent_events: Some(count),
            after_timestamp: None,
        }
    }

    pub fn after(timestamp: Timestamp) -> Self {
        Self {
            num_recent_events: None,
            after_timestamp: Some(timestamp),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListEventsResponse {
    pub events: Vec<Event>,
}

/// Service statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub session_count: usize,
    pub event_count: usize,
    pub subscription_count: usize,
}
