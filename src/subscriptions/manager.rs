//! Subscription manager for broadcasting session changes.

use crate::error::{Result, StoreError};
use crate::types::{Event, SessionSummary};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::types::{
    DropReason, SessionChange, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<SessionChange>,
}

impl Subscription {
    /// Try to send a change. Returns false if buffer is full or the receiver
    /// is gone (subscriber will be dropped).
    fn try_send(&self, change: SessionChange) -> bool {
        self.sender.try_send(change).is_ok()
    }

    fn matches_lifecycle(&self, app_name: &str, user_id: &str, session_id: &str) -> bool {
        let filter = &self.config.filter;
        filter.include_lifecycle && filter.matches_scope(app_name, user_id, session_id)
    }

    fn matches_event(&self, app_name: &str, user_id: &str, session_id: &str) -> bool {
        let filter = &self.config.filter;
        filter.include_events && filter.matches_scope(app_name, user_id, session_id)
    }
}

/// Manages subscriptions and broadcasts changes.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription.
    ///
    /// Live changes are delivered from this point on.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let (id, sub, receiver) = self.open(config);
        self.subscriptions.write().insert(id, sub);
        SubscriptionHandle { id, receiver }
    }

    /// Create a subscription that first receives a `SessionCreated` for each
    /// of `existing` its filter matches, then `CaughtUp`.
    ///
    /// The replay is queued before the subscription is registered, so every
    /// live change arrives after it. The caller must keep `existing` from
    /// going stale until this returns. Fails if the replay overflows the
    /// buffer; nothing is registered then.
    pub fn subscribe_with_replay(
        &self,
        config: SubscriptionConfig,
        existing: Vec<SessionSummary>,
    ) -> Result<SubscriptionHandle> {
        let (id, sub, receiver) = self.open(config);

        for session in existing {
            if !sub.matches_lifecycle(&session.app_name, &session.user_id, &session.id) {
                continue;
            }
            let change = SessionChange::SessionCreated {
                session,
                replaced: false,
            };
            if !sub.try_send(change) {
                debug!(subscription = id.0, "dropped subscriber during catch-up");
                return Err(StoreError::SubscriptionDropped(id));
            }
        }
        if !sub.try_send(SessionChange::CaughtUp) {
            debug!(subscription = id.0, "dropped subscriber during catch-up");
            return Err(StoreError::SubscriptionDropped(id));
        }

        self.subscriptions.write().insert(id, sub);
        Ok(SubscriptionHandle { id, receiver })
    }

    fn open(
        &self,
        config: SubscriptionConfig,
    ) -> (SubscriptionId, Subscription, Receiver<SessionChange>) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));
        (id, Subscription { config, sender }, receiver)
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Best effort
            let _ = sub.sender.try_send(SessionChange::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    // --- Broadcasting ---

    /// Broadcast a created (or overwritten) session.
    pub fn broadcast_created(&self, session: &SessionSummary, replaced: bool) {
        let change = SessionChange::SessionCreated {
            session: session.clone(),
            replaced,
        };

        self.broadcast(
            |sub| sub.matches_lifecycle(&session.app_name, &session.user_id, &session.id),
            change,
        );
    }

    /// Broadcast a committed event.
    pub fn broadcast_appended(&self, app_name: &str, user_id: &str, session_id: &str, event: &Event) {
        // Skip building the change when nobody listens.
        if self.subscription_count() == 0 {
            return;
        }

        let change = SessionChange::EventAppended {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            event: event.clone(),
        };

        self.broadcast(|sub| sub.matches_event(app_name, user_id, session_id), change);
    }

    /// Broadcast a deleted session.
    pub fn broadcast_deleted(&self, app_name: &str, user_id: &str, session_id: &str) {
        let change = SessionChange::SessionDeleted {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        };

        self.broadcast(|sub| sub.matches_lifecycle(app_name, user_id, session_id), change);
    }

    /// Internal broadcast helper. Drops subscribers that fail to receive.
    fn broadcast<F>(&self, filter: F, change: SessionChange)
    where
        F: Fn(&Subscription) -> bool,
    {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if filter(sub) && !sub.try_send(change.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            self.drop_subscriptions(to_remove);
        }
    }

    fn drop_subscriptions(&self, ids: Vec<SubscriptionId>) {
        let mut subs = self.subscriptions.write();
        for id in ids {
            if subs.remove(&id).is_some() {
                debug!(subscription = id.0, "dropped slow subscriber");
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
