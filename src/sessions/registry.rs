//! Registry implementation.
//!
//! Lock order is registry map, then session entry, then whatever a commit
//! callback takes. Callbacks run while the locks that order the change are
//! held, so anything they publish comes out in commit order.

use crate::events::EventLog;
use crate::state::State;
use crate::types::{Event, EventInput, GetSessionConfig, Session, SessionSummary, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Mutable part of a session, guarded as one unit.
#[derive(Debug)]
struct SessionData {
    state: State,
    log: EventLog,
    last_update_time: Timestamp,

    /// Set once the entry leaves the registry (deleted or overwritten).
    retired: bool,
}

/// Result of appending to an entry.
#[derive(Debug)]
pub enum AppendOutcome {
    /// The event was recorded and its delta applied.
    Committed(Event),
    /// The entry was retired first; the input comes back untouched.
    Retired(EventInput),
}

/// A live session owned by the registry.
#[derive(Debug)]
pub struct SessionEntry {
    app_name: String,
    user_id: String,
    id: String,

    /// Distinguishes this entry from earlier or later sessions under the
    /// same id. Assigned from a counter that only grows, so it also gives
    /// insertion order.
    incarnation: u64,

    data: RwLock<SessionData>,
}

impl SessionEntry {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn incarnation(&self) -> u64 {
        self.incarnation
    }

    pub fn is_retired(&self) -> bool {
        self.data.read().retired
    }

    /// Append an event and merge its delta into the state as one step.
    ///
    /// Readers see either none or all of the append. `on_commit` runs with
    /// the write lock still held, so successive commits reach it in log
    /// order.
    pub fn append<F>(&self, input: EventInput, on_commit: F) -> AppendOutcome
    where
        F: FnOnce(&Event),
    {
        let mut data = self.data.write();
        if data.retired {
            return AppendOutcome::Retired(input);
        }

        let event = data.log.append(input);
        data.state.apply(event.state_delta());
        data.last_update_time = event.timestamp;
        on_commit(&event);
        AppendOutcome::Committed(event)
    }

    /// Copy the session out, with events narrowed by `config`.
    pub fn snapshot(&self, config: Option<&GetSessionConfig>) -> Session {
        let data = self.data.read();

        let events = match config {
            Some(GetSessionConfig {
                num_recent_events: Some(count),
                ..
            }) => data.log.recent(*count),
            Some(GetSessionConfig {
                after_timestamp: Some(after),
                ..
            }) => data.log.since(*after),
            _ => data.log.list(),
        };

        Session {
            app_name: self.app_name.clone(),
            user_id: self.user_id.clone(),
            id: self.id.clone(),
            state: data.state.committed(),
            events,
            last_update_time: data.last_update_time,
            incarnation: Some(self.incarnation),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary_of(&self.data.read())
    }

    pub fn events(&self) -> Vec<Event> {
        self.data.read().log.list()
    }

    pub fn event_count(&self) -> usize {
        self.data.read().log.len()
    }

    fn summary_of(&self, data: &SessionData) -> SessionSummary {
        SessionSummary {
            app_name: self.app_name.clone(),
            user_id: self.user_id.clone(),
            id: self.id.clone(),
            last_update_time: data.last_update_time,
            event_count: data.log.len(),
        }
    }

    /// Mark the entry retired, running `on_retire` under the write lock.
    fn retire<F>(&self, on_retire: F)
    where
        F: FnOnce(&SessionEntry),
    {
        let mut data = self.data.write();
        data.retired = true;
        on_retire(self);
    }
}

/// Sessions of one user, keyed by session id.
type UserSessions = HashMap<String, Arc<SessionEntry>>;

/// Concurrency-safe table of sessions keyed by (app name, user id, session id).
pub struct SessionRegistry {
    /// app name -> user id -> session id -> entry.
    apps: RwLock<HashMap<String, HashMap<String, UserSessions>>>,

    /// Next incarnation to assign.
    next_incarnation: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            apps: RwLock::new(HashMap::new()),
            next_incarnation: AtomicU64::new(1),
        }
    }

    /// Insert `session`, replacing and retiring any entry with the same
    /// identity.
    ///
    /// The session's events seed the new entry's log. `on_insert` receives
    /// the new entry and whether one was replaced, while the map is still
    /// write-locked. Returns the same pair.
    pub fn put<F>(&self, session: Session, on_insert: F) -> (Arc<SessionEntry>, bool)
    where
        F: FnOnce(&SessionEntry, bool),
    {
        let mut apps = self.apps.write();

        // Assigned under the write lock so incarnation order matches the
        // order entries became visible.
        let incarnation = self.next_incarnation.fetch_add(1, Ordering::SeqCst);

        let entry = Arc::new(SessionEntry {
            app_name: session.app_name.clone(),
            user_id: session.user_id.clone(),
            id: session.id.clone(),
            incarnation,
            data: RwLock::new(SessionData {
                state: session.state.committed(),
                log: EventLog::from_events(session.events),
                last_update_time: session.last_update_time,
                retired: false,
            }),
        });

        let previous = apps
            .entry(session.app_name)
            .or_default()
            .entry(session.user_id)
            .or_default()
            .insert(session.id, Arc::clone(&entry));

        let replaced = match previous {
            Some(old) => {
                old.retire(|_| {});
                true
            }
            None => false,
        };
        on_insert(&entry, replaced);

        (entry, replaced)
    }

    pub fn get(&self, app_name: &str, user_id: &str, session_id: &str) -> Option<Arc<SessionEntry>> {
        self.apps
            .read()
            .get(app_name)
            .and_then(|users| users.get(user_id))
            .and_then(|sessions| sessions.get(session_id))
            .cloned()
    }

    /// Sessions of one user in insertion order. Replacing a session moves it
    /// to the end.
    pub fn list_by_user(&self, app_name: &str, user_id: &str) -> Vec<Arc<SessionEntry>> {
        let mut entries: Vec<Arc<SessionEntry>> = self
            .apps
            .read()
            .get(app_name)
            .and_then(|users| users.get(user_id))
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default();

        entries.sort_by_key(|entry| entry.incarnation);
        entries
    }

    /// Remove and retire a session. Removing an absent session is a no-op.
    ///
    /// `on_remove` runs after the entry is retired, with both the map and
    /// the entry write-locked, so no append to the entry can follow it.
    /// Returns the removed entry, if any. Empty user and app scopes are
    /// dropped along with their last session.
    pub fn remove<F>(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        on_remove: F,
    ) -> Option<Arc<SessionEntry>>
    where
        F: FnOnce(&SessionEntry),
    {
        let mut apps = self.apps.write();

        let users = apps.get_mut(app_name)?;
        let sessions = users.get_mut(user_id)?;
        let removed = sessions.remove(session_id)?;

        if sessions.is_empty() {
            users.remove(user_id);
        }
        if users.is_empty() {
            apps.remove(app_name);
        }

        removed.retire(on_remove);
        Some(removed)
    }

    /// Whether `incarnation` is the live entry for this identity.
    pub fn is_live(&self, app_name: &str, user_id: &str, session_id: &str, incarnation: u64) -> bool {
        self.get(app_name, user_id, session_id)
            .map(|entry| entry.incarnation == incarnation)
            .unwrap_or(false)
    }

    /// All live entries, in no particular order.
    pub fn entries(&self) -> Vec<Arc<SessionEntry>> {
        self.apps
            .read()
            .values()
            .flat_map(|users| users.values())
            .flat_map(|sessions| sessions.values().cloned())
            .collect()
    }

    /// Run `f` on summaries of every live session, in insertion order, while
    /// no session can be created, deleted, or appended to.
    pub fn with_frozen_summaries<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Vec<SessionSummary>) -> R,
    {
        let apps = self.apps.read();

        let mut entries: Vec<&Arc<SessionEntry>> = apps
            .values()
            .flat_map(|users| users.values())
            .flat_map(|sessions| sessions.values())
            .collect();
        entries.sort_by_key(|entry| entry.incarnation);

        let guards: Vec<_> = entries.iter().map(|entry| entry.data.read()).collect();
        let summaries: Vec<SessionSummary> = entries
            .iter()
            .zip(&guards)
            .map(|(entry, data)| entry.summary_of(data))
            .collect();

        f(summaries)
    }

    pub fn len(&self) -> usize {
        self.apps
            .read()
            .values()
            .flat_map(|users| users.values())
            .map(|sessions| sessions.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.read().is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateDelta;
    use serde_json::json;

    fn session(id: &str) -> Session {
        Session::new("app", "user", id)
    }

    #[test]
    fn test_put_and_get() {
        let registry = SessionRegistry::new();
        let (entry, replaced) = registry.put(session("s1"), |_, _| {});

        assert!(!replaced);
        let found = registry.get("app", "user", "s1").unwrap();
        assert_eq!(found.id(), "s1");
        assert_eq!(found.incarnation(), entry.incarnation());

        assert!(registry.get("app", "user", "missing").is_none());
        assert!(registry.get("app", "other", "s1").is_none());
        assert!(registry.get("other", "user", "s1").is_none());
    }

    #[test]
    fn test_put_overwrites_with_new_incarnation() {
        let registry = SessionRegistry::new();
        let (first, _) = registry.put(session("s1"), |_, _| {});
        let (second, replaced) = registry.put(session("s1"), |_, _| {});

        assert!(replaced);
        assert!(second.incarnation() > first.incarnation());
        assert!(registry.is_live("app", "user", "s1", second.incarnation()));
        assert!(!registry.is_live("app", "user", "s1", first.incarnation()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_by_user_in_insertion_order() {
        let registry = SessionRegistry::new();
        for id in ["c", "a", "b"] {
            registry.put(session(id), |_, _| {});
        }
        registry.put(Session::new("app", "someone-else", "z"), |_, _| {});

        let ids: Vec<String> = registry
            .list_by_user("app", "user")
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        assert!(registry.list_by_user("app", "nobody").is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.put(session("s1"), |_, _| {});

        assert!(registry.remove("app", "user", "s1", |_| {}).is_some());
        assert!(registry.remove("app", "user", "s1", |_| {}).is_none());
        assert!(registry.remove("nope", "nope", "nope", |_| {}).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_entry_append_merges_state() {
        let registry = SessionRegistry::new();
        let (entry, _) = registry.put(
            session("s1").with_state(HashMap::from([("keep".to_string(), json!(1))])),
            |_, _| {},
        );

        let mut committed = Vec::new();
        let event = match entry.append(
            EventInput::new("agent")
                .with_timestamp(Timestamp(99))
                .with_state_delta(StateDelta::new().set("added", true)),
            |event| committed.push(event.id.clone()),
        ) {
            AppendOutcome::Committed(event) => event,
            AppendOutcome::Retired(_) => panic!("live entry refused append"),
        };
        assert_eq!(committed, vec![event.id.clone()]);

        let snapshot = entry.snapshot(None);
        assert_eq!(snapshot.state.get("keep"), Some(&json!(1)));
        assert_eq!(snapshot.state.get("added"), Some(&json!(true)));
        assert_eq!(snapshot.events, vec![event]);
        assert_eq!(snapshot.last_update_time, Timestamp(99));
        assert_eq!(entry.summary().event_count, 1);
    }

    #[test]
    fn test_removed_entry_refuses_appends() {
        let registry = SessionRegistry::new();
        let (entry, _) = registry.put(session("s1"), |_, _| {});
        entry.append(EventInput::new("agent"), |_| {});

        let mut removed = None;
        registry.remove("app", "user", "s1", |entry| {
            removed = Some(entry.id().to_string());
        });
        assert_eq!(removed.as_deref(), Some("s1"));

        let mut called = false;
        let outcome = entry.append(EventInput::new("agent").with_id("late"), |_| called = true);

        assert!(matches!(outcome, AppendOutcome::Retired(input) if input.id.as_deref() == Some("late")));
        assert!(!called);
        assert!(entry.is_retired());
        assert_eq!(entry.event_count(), 1);
        assert!(registry.get("app", "user", "s1").is_none());
    }

    #[test]
    fn test_overwrite_retires_previous_entry() {
        let registry = SessionRegistry::new();
        let (first, _) = registry.put(session("s1"), |_, _| {});

        let mut seen = None;
        let (second, _) = registry.put(session("s1"), |entry, replaced| {
            seen = Some((entry.incarnation(), replaced));
        });

        assert_eq!(seen, Some((second.incarnation(), true)));
        assert!(first.is_retired());
        assert!(!second.is_retired());
    }

    #[test]
    fn test_frozen_summaries_in_insertion_order() {
        let registry = SessionRegistry::new();
        for id in ["b", "a"] {
            registry.put(session(id), |_, _| {});
        }
        let (entry, _) = registry.put(session("c"), |_, _| {});
        entry.append(EventInput::new("agent"), |_| {});

        let summaries = registry.with_frozen_summaries(|summaries| summaries);

        let ids: Vec<&str> = summaries.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(summaries[2].event_count, 1);
    }

    #[test]
    fn test_snapshot_config_prefers_recent_count() {
        let registry = SessionRegistry::new();
        let (entry, _) = registry.put(session("s1"), |_, _| {});
        for n in 1..=4 {
            entry.append(EventInput::new("agent").with_timestamp(Timestamp(n)), |_| {});
        }

        let config = GetSessionConfig {
            num_recent_events: Some(1),
            after_timestamp: Some(Timestamp(2)),
        };
        let snapshot = entry.snapshot(Some(&config));
        assert_eq!(snapshot.events.len(), 1);
        assert_eq!(snapshot.events[0].timestamp, Timestamp(4));

        let snapshot = entry.snapshot(Some(&GetSessionConfig::after(Timestamp(2))));
        assert_eq!(snapshot.events.len(), 3);
    }
}
