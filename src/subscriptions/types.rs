//! Subscription types for session change notifications.

use crate::types::{Event, SessionSummary};
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered changes before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Replay a `SessionCreated` for every matching live session before
    /// streaming live changes, followed by `CaughtUp`.
    pub replay_existing: bool,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            replay_existing: false,
            filter: SubscriptionFilter::all(),
        }
    }
}

/// Filter criteria for subscriptions.
///
/// Scope fields narrow from app to user to session; `None` matches anything.
/// The default matches every change.
#[derive(Clone, Debug)]
pub struct SubscriptionFilter {
    pub app_name: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,

    /// Include session created/deleted changes.
    pub include_lifecycle: bool,

    /// Include appended events.
    pub include_events: bool,
}

impl SubscriptionFilter {
    /// Everything, for every session.
    pub fn all() -> Self {
        Self {
            app_name: None,
            user_id: None,
            session_id: None,
            include_lifecycle: true,
            include_events: true,
        }
    }

    /// Everything within one application.
    pub fn app(app_name: impl Into<String>) -> Self {
        Self {
            app_name: Some(app_name.into()),
            ..Self::all()
        }
    }

    /// Everything for one user of one application.
    pub fn user(app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::app(app_name)
        }
    }

    /// Everything for a single session.
    pub fn session(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::user(app_name, user_id)
        }
    }

    /// Only session lifecycle changes.
    pub fn lifecycle_only(mut self) -> Self {
        self.include_lifecycle = true;
        self.include_events = false;
        self
    }

    /// Only appended events.
    pub fn events_only(mut self) -> Self {
        self.include_lifecycle = false;
        self.include_events = true;
        self
    }

    pub(crate) fn matches_scope(&self, app_name: &str, user_id: &str, session_id: &str) -> bool {
        self.app_name.as_deref().map_or(true, |a| a == app_name)
            && self.user_id.as_deref().map_or(true, |u| u == user_id)
            && self.session_id.as_deref().map_or(true, |s| s == session_id)
    }
}

impl Default for SubscriptionFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Changes emitted by subscriptions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionChange {
    /// A session was created (or replayed during catch-up).
    SessionCreated {
        session: SessionSummary,
        /// True if an earlier session with the same id was overwritten.
        replaced: bool,
    },

    /// An event was committed to a session.
    EventAppended {
        app_name: String,
        user_id: String,
        session_id: String,
        event: Event,
    },

    /// A session was deleted.
    SessionDeleted {
        app_name: String,
        user_id: String,
        session_id: String,
    },

    /// Finished replaying existing sessions, now streaming live.
    CaughtUp,

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
///
/// A subscriber dropped for overflowing its buffer gets no message; its
/// receiver disconnects once the buffered changes are read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive changes.
    pub receiver: crossbeam_channel::Receiver<SessionChange>,
}

impl SubscriptionHandle {
    /// Receive the next change (blocking).
    pub fn recv(&self) -> Result<SessionChange, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a change (non-blocking).
    pub fn try_recv(&self) -> Result<SessionChange, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<SessionChange, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<SessionChange> {
        self.receiver.try_iter().collect()
    }
}
