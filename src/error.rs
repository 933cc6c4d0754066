//! Error types for the session store.

use crate::subscriptions::SubscriptionId;
use thiserror::Error;

/// Main error type for store operations.
///
/// Lookups of absent sessions are not errors: they surface as `Ok(None)` or
/// empty responses. Deleting an absent session succeeds silently.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {app_name}/{user_id}/{session_id}")]
    SessionNotFound {
        app_name: String,
        user_id: String,
        session_id: String,
    },

    #[error("Subscription dropped: {0:?}")]
    SubscriptionDropped(SubscriptionId),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub(crate) fn session_not_found(app_name: &str, user_id: &str, session_id: &str) -> Self {
        StoreError::SessionNotFound {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
