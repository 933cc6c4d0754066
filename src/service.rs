//! Session service: the entry point tying the registry, event logs, state
//! merging, and change feed together.

use crate::error::{Result, StoreError};
use crate::sessions::{AppendOutcome, SessionEntry, SessionRegistry};
use crate::subscriptions::{SubscriptionConfig, SubscriptionHandle, SubscriptionId, SubscriptionManager};
use crate::types::{
    generate_id, Event, EventInput, GetSessionConfig, ListEventsResponse, ListSessionsResponse,
    ServiceStats, Session,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Operations every session backend provides.
///
/// Absent sessions are a normal outcome: lookups return `Ok(None)` or empty
/// responses and deletes of absent sessions succeed. The `Result` leaves room
/// for backends that can fail; the in-memory backend only fails where
/// [`DetachedAppendPolicy::Reject`] says so.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Create a session, generating an id when `session_id` is `None` or
    /// blank. An existing session with the same id is overwritten.
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<HashMap<String, Value>>,
        session_id: Option<String>,
    ) -> Result<Session>;

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: Option<GetSessionConfig>,
    ) -> Result<Option<Session>>;

    /// Summaries of a user's sessions, without state or events.
    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<ListSessionsResponse>;

    async fn delete_session(&self, app_name: &str, user_id: &str, session_id: &str) -> Result<()>;

    /// Record `event` in the session and apply its state delta.
    ///
    /// The caller's `session` snapshot receives the same delta and the stored
    /// event. Partial events are returned without being recorded.
    async fn append_event(&self, session: &mut Session, event: EventInput) -> Result<Event>;

    async fn list_events(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<ListEventsResponse>;
}

/// What `append_event` does with a session snapshot that is not the live
/// registry entry: never registered, deleted, or replaced by a later
/// `create_session` with the same id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DetachedAppendPolicy {
    /// Apply the event to the caller's snapshot only and log a warning.
    #[default]
    Permissive,
    /// Fail with [`StoreError::SessionNotFound`], leaving the snapshot as is.
    Reject,
}

/// Service configuration.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub detached_append: DetachedAppendPolicy,

    /// Publish session changes to subscribers.
    pub publish_changes: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            detached_append: DetachedAppendPolicy::Permissive,
            publish_changes: true,
        }
    }
}

/// Session service backed by process memory.
///
/// Each instance owns its own registry; instances never share sessions.
pub struct InMemorySessionService {
    config: ServiceConfig,

    registry: SessionRegistry,

    subscriptions: SubscriptionManager,
}

impl InMemorySessionService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            registry: SessionRegistry::new(),
            subscriptions: SubscriptionManager::new(),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn stats(&self) -> ServiceStats {
        let entries = self.registry.entries();
        ServiceStats {
            session_count: entries.len(),
            event_count: entries.iter().map(|entry| entry.event_count()).sum(),
            subscription_count: self.subscriptions.subscription_count(),
        }
    }

    // --- Change feed ---

    /// Subscribe to session changes.
    ///
    /// Changes to one session arrive in commit order: its creation, then its
    /// events as they appear in the log, then its deletion. With
    /// `replay_existing`, every matching live session is first sent as a
    /// `SessionCreated` carrying its event count at that instant, then
    /// `CaughtUp`; live changes follow without gaps or repeats.
    pub fn subscribe(&self, config: SubscriptionConfig) -> Result<SubscriptionHandle> {
        if !config.replay_existing {
            return Ok(self.subscriptions.subscribe(config));
        }

        self.registry.with_frozen_summaries(|existing| {
            self.subscriptions.subscribe_with_replay(config, existing)
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.unsubscribe(id);
    }

    /// The registry entry `session` was read from, if it is still live.
    fn live_entry(&self, session: &Session) -> Option<Arc<SessionEntry>> {
        let incarnation = session.incarnation?;
        self.registry
            .get(&session.app_name, &session.user_id, &session.id)
            .filter(|entry| entry.incarnation() == incarnation)
    }
}

impl Default for InMemorySessionService {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<HashMap<String, Value>>,
        session_id: Option<String>,
    ) -> Result<Session> {
        let session_id = session_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_id);

        let session =
            Session::new(app_name, user_id, session_id.as_str()).with_state(state.unwrap_or_default());
        let (entry, replaced) = self.registry.put(session, |entry, replaced| {
            if self.config.publish_changes {
                self.subscriptions.broadcast_created(&entry.summary(), replaced);
            }
        });

        if replaced {
            debug!(app_name, user_id, session_id = %session_id, "overwrote existing session");
        } else {
            debug!(app_name, user_id, session_id = %session_id, "created session");
        }

        Ok(entry.snapshot(None))
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: Option<GetSessionConfig>,
    ) -> Result<Option<Session>> {
        Ok(self
            .registry
            .get(app_name, user_id, session_id)
            .map(|entry| entry.snapshot(config.as_ref())))
    }

    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<ListSessionsResponse> {
        let sessions = self
            .registry
            .list_by_user(app_name, user_id)
            .iter()
            .map(|entry| entry.summary())
            .collect();

        Ok(ListSessionsResponse { sessions })
    }

    async fn delete_session(&self, app_name: &str, user_id: &str, session_id: &str) -> Result<()> {
        let removed = self.registry.remove(app_name, user_id, session_id, |_| {
            if self.config.publish_changes {
                self.subscriptions.broadcast_deleted(app_name, user_id, session_id);
            }
        });
        if removed.is_some() {
            debug!(app_name, user_id, session_id, "deleted session");
        }
        Ok(())
    }

    async fn append_event(&self, session: &mut Session, event: EventInput) -> Result<Event> {
        if event.partial {
            let event = event.into_event();
            trace!(session_id = %session.id, event_id = %event.id, "skipped partial event");
            return Ok(event);
        }

        let outcome = match self.live_entry(session) {
            Some(entry) => entry.append(event, |stored| {
                if self.config.publish_changes {
                    self.subscriptions.broadcast_appended(
                        &session.app_name,
                        &session.user_id,
                        &session.id,
                        stored,
                    );
                }
            }),
            None => AppendOutcome::Retired(event),
        };

        let stored = match outcome {
            AppendOutcome::Committed(stored) => {
                trace!(
                    session_id = %session.id,
                    event_id = %stored.id,
                    delta_keys = stored.state_delta().len(),
                    "appended event"
                );
                stored
            }
            AppendOutcome::Retired(event) => match self.config.detached_append {
                DetachedAppendPolicy::Reject => {
                    return Err(StoreError::session_not_found(
                        &session.app_name,
                        &session.user_id,
                        &session.id,
                    ));
                }
                DetachedAppendPolicy::Permissive => {
                    let stored = event.into_event();
                    warn!(
                        app_name = %session.app_name,
                        user_id = %session.user_id,
                        session_id = %session.id,
                        event_id = %stored.id,
                        "appending to a session that is not live; only the caller's copy changes"
                    );
                    stored
                }
            },
        };

        session.state.apply(stored.state_delta());
        session.events.push(stored.clone());
        session.last_update_time = stored.timestamp;

        Ok(stored)
    }

    async fn list_events(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<ListEventsResponse> {
        let events = self
            .registry
            .get(app_name, user_id, session_id)
            .map(|entry| entry.events())
            .unwrap_or_default();

        Ok(ListEventsResponse { events })
    }
}
