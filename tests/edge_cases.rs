//! Error handling and edge case tests.

use serde_json::json;
use session_store::{
    DetachedAppendPolicy, EventInput, InMemorySessionService, ServiceConfig, Session,
    SessionService, StateDelta, StoreError,
};
use std::collections::HashMap;

fn strict_service() -> InMemorySessionService {
    InMemorySessionService::new(ServiceConfig {
        detached_append: DetachedAppendPolicy::Reject,
        ..Default::default()
    })
}

// --- Not Found ---

#[tokio::test]
async fn test_delete_unknown_session_is_noop() {
    let service = InMemorySessionService::default();

    service.delete_session("app", "user", "ghost").await.unwrap();
    service.delete_session("app", "user", "ghost").await.unwrap();

    assert_eq!(service.stats().session_count, 0);
}

#[tokio::test]
async fn test_scopes_are_isolated() {
    let service = InMemorySessionService::default();
    let session = service
        .create_session("app", "alice", None, Some("shared".to_string()))
        .await
        .unwrap();

    assert!(service
        .get_session("app", "bob", &session.id, None)
        .await
        .unwrap()
        .is_none());
    assert!(service
        .get_session("other-app", "alice", &session.id, None)
        .await
        .unwrap()
        .is_none());
    assert!(service.list_sessions("app", "bob").await.unwrap().sessions.is_empty());
}

// --- Overwrite ---

#[tokio::test]
async fn test_create_with_existing_id_overwrites() {
    let service = InMemorySessionService::default();
    service
        .create_session(
            "app",
            "user",
            Some(HashMap::from([("old".to_string(), json!(true))])),
            Some("s1".to_string()),
        )
        .await
        .unwrap();

    let replacement = service
        .create_session(
            "app",
            "user",
            Some(HashMap::from([("new".to_string(), json!(true))])),
            Some("s1".to_string()),
        )
        .await
        .unwrap();

    let live = service
        .get_session("app", "user", "s1", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(live.state, replacement.state);
    assert!(!live.state.contains_key("old"));
    assert_eq!(service.list_sessions("app", "user").await.unwrap().sessions.len(), 1);
}

#[tokio::test]
async fn test_overwritten_snapshot_is_detached() {
    let service = InMemorySessionService::default();
    let mut stale = service
        .create_session("app", "user", None, Some("s1".to_string()))
        .await
        .unwrap();
    service
        .create_session("app", "user", None, Some("s1".to_string()))
        .await
        .unwrap();

    service
        .append_event(
            &mut stale,
            EventInput::new("agent").with_state_delta(StateDelta::new().set("k", 1)),
        )
        .await
        .unwrap();

    // The caller's copy changed, the replacement did not.
    assert_eq!(stale.state.get("k"), Some(&json!(1)));
    let live = service
        .get_session("app", "user", "s1", None)
        .await
        .unwrap()
        .unwrap();
    assert!(live.state.is_empty());
    assert!(live.events.is_empty());
}

// --- Detached Appends ---

#[tokio::test]
async fn test_append_after_delete_does_not_resurrect() {
    let service = InMemorySessionService::default();
    let mut session = service.create_session("app", "user", None, None).await.unwrap();
    service
        .delete_session("app", "user", &session.id)
        .await
        .unwrap();

    let event = service
        .append_event(
            &mut session,
            EventInput::new("agent").with_state_delta(StateDelta::new().set("k", "v")),
        )
        .await
        .unwrap();

    assert_eq!(session.state.get("k"), Some(&json!("v")));
    assert_eq!(session.events, vec![event]);
    assert!(service
        .get_session("app", "user", &session.id, None)
        .await
        .unwrap()
        .is_none());
    assert!(service
        .list_events("app", "user", &session.id)
        .await
        .unwrap()
        .events
        .is_empty());
}

#[tokio::test]
async fn test_append_to_untracked_session_is_permissive() {
    let service = InMemorySessionService::default();
    let mut session = Session::new("app", "user", "never-created");

    service
        .append_event(
            &mut session,
            EventInput::new("agent").with_state_delta(StateDelta::new().set("k", 1)),
        )
        .await
        .unwrap();

    assert_eq!(session.state.get("k"), Some(&json!(1)));
    assert_eq!(service.stats().session_count, 0);
}

#[tokio::test]
async fn test_append_after_delete_rejected_in_strict_mode() {
    let service = strict_service();
    let mut session = service.create_session("app", "user", None, None).await.unwrap();
    service
        .delete_session("app", "user", &session.id)
        .await
        .unwrap();

    let result = service
        .append_event(
            &mut session,
            EventInput::new("agent").with_state_delta(StateDelta::new().set("k", 1)),
        )
        .await;

    match result {
        Err(StoreError::SessionNotFound { session_id, .. }) => assert_eq!(session_id, session.id),
        other => panic!("expected SessionNotFound, got {:?}", other),
    }
    assert!(session.state.is_empty());
}

#[tokio::test]
async fn test_strict_mode_accepts_live_session() {
    let service = strict_service();
    let mut session = service.create_session("app", "user", None, None).await.unwrap();

    service
        .append_event(
            &mut session,
            EventInput::new("agent").with_state_delta(StateDelta::new().set("k", 1)),
        )
        .await
        .unwrap();

    assert_eq!(service.stats().event_count, 1);
}

#[tokio::test]
async fn test_deserialized_snapshot_is_detached() {
    // A snapshot that went through serialization has lost its registry link.
    let service = strict_service();
    let session = service.create_session("app", "user", None, None).await.unwrap();
    let encoded = serde_json::to_string(&session).unwrap();
    let mut decoded: Session = serde_json::from_str(&encoded).unwrap();

    let result = service
        .append_event(&mut decoded, EventInput::new("agent"))
        .await;

    assert!(matches!(result, Err(StoreError::SessionNotFound { .. })));
}

// --- Deltas ---

#[tokio::test]
async fn test_tombstone_for_missing_key() {
    let service = InMemorySessionService::default();
    let mut session = service.create_session("app", "user", None, None).await.unwrap();

    service
        .append_event(
            &mut session,
            EventInput::new("agent").with_state_delta(StateDelta::new().remove("absent")),
        )
        .await
        .unwrap();

    assert!(session.state.is_empty());
    assert_eq!(service.stats().event_count, 1);
}

#[tokio::test]
async fn test_null_value_is_stored() {
    let service = InMemorySessionService::default();
    let mut session = service.create_session("app", "user", None, None).await.unwrap();

    service
        .append_event(
            &mut session,
            EventInput::new("agent").with_state_delta(StateDelta::new().set("k", json!(null))),
        )
        .await
        .unwrap();

    let live = service
        .get_session("app", "user", &session.id, None)
        .await
        .unwrap()
        .unwrap();
    assert!(live.state.contains_key("k"));
    assert_eq!(live.state.get("k"), Some(&json!(null)));
}

#[tokio::test]
async fn test_state_view_builds_delta() {
    let service = InMemorySessionService::default();
    let mut session = service
        .create_session(
            "app",
            "user",
            Some(HashMap::from([("draft".to_string(), json!("..."))])),
            None,
        )
        .await
        .unwrap();

    // Mutate a view of the state, then ship the recorded change.
    let mut view = session.state.clone();
    view.remove("draft");
    view.put("final", "done");
    let delta = view.take_delta();

    service
        .append_event(&mut session, EventInput::new("agent").with_state_delta(delta))
        .await
        .unwrap();

    let live = service
        .get_session("app", "user", &session.id, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(live.state, view);
}
