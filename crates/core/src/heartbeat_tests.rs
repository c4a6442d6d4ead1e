// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::delivery::OutboundQueue;
use crate::model::Session;
use crate::registry::{SessionHandle, StallReason};
use crate::store::fake::FakeStore;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

fn insert_handle_and_session(
    registry: &SessionRegistry,
    store: &FakeStore,
    last_seen_ms_ago: i64,
    store_valid: bool,
) -> Arc<SessionHandle> {
    let now = chrono::Utc::now();
    let id = Uuid::new_v4();
    store.put_session(Session {
        id,
        agent_id: "agent-1".into(),
        bearer_token: "tok".into(),
        provider: "anonymous".into(),
        sync_group: "g".into(),
        started_at: now,
        last_seen_at: now,
        expires_at: if store_valid { now + chrono::Duration::hours(1) } else { now - chrono::Duration::hours(1) },
        is_active: store_valid,
    });

    let handle = Arc::new(SessionHandle::new(
        id,
        "agent-1".into(),
        "g".into(),
        "tok".into(),
        "anonymous".into(),
        true,
        Arc::new(OutboundQueue::new(8)),
    ));
    // Force last_seen into the past to simulate elapsed inactivity.
    handle.touch();
    let past = crate::model::epoch_ms() - last_seen_ms_ago;
    handle.force_last_seen_ms(past);
    handle
}

#[tokio::test]
async fn sweep_ignores_recently_seen_sessions() {
    let registry = SessionRegistry::new();
    let store = FakeStore::new();
    let handle = insert_handle_and_session(&registry, &store, 10, true);
    registry.insert(handle.clone()).await;

    sweep_once(&registry, &store, Duration::from_millis(1000), &mut HashSet::new()).await;
    assert!(registry.lookup(handle.id).await.is_some());
    assert_eq!(handle.state().await, SessionState::Connected);
}

#[tokio::test]
async fn sweep_marks_inactive_but_still_valid_session_stalled() {
    let registry = SessionRegistry::new();
    let store = FakeStore::new();
    let handle = insert_handle_and_session(&registry, &store, 5_000, true);
    registry.insert(handle.clone()).await;

    sweep_once(&registry, &store, Duration::from_millis(1000), &mut HashSet::new()).await;
    assert!(registry.lookup(handle.id).await.is_some());
    assert_eq!(handle.state().await, SessionState::Stalled);
}

#[tokio::test]
async fn sweep_closes_session_that_fails_revalidation() {
    let registry = SessionRegistry::new();
    let store = FakeStore::new();
    let handle = insert_handle_and_session(&registry, &store, 5_000, false);
    registry.insert(handle.clone()).await;

    sweep_once(&registry, &store, Duration::from_millis(1000), &mut HashSet::new()).await;
    assert!(registry.lookup(handle.id).await.is_none());
}

#[tokio::test]
async fn sweep_keeps_inactivity_stalled_session_open_while_store_valid() {
    // A session that's merely quiet (store session still valid) must stay
    // `stalled`, not get force-closed, across repeated sweeps — only a
    // backpressure stall gets the one-pass grace-close (spec.md §4.3/§7).
    let registry = SessionRegistry::new();
    let store = FakeStore::new();
    let handle = insert_handle_and_session(&registry, &store, 5_000, true);
    registry.insert(handle.clone()).await;

    let mut backpressure_stalled = HashSet::new();
    sweep_once(&registry, &store, Duration::from_millis(1000), &mut backpressure_stalled).await;
    assert_eq!(handle.state().await, SessionState::Stalled);

    sweep_once(&registry, &store, Duration::from_millis(1000), &mut backpressure_stalled).await;
    assert!(registry.lookup(handle.id).await.is_some());
    assert_eq!(handle.state().await, SessionState::Stalled);
}

#[tokio::test]
async fn sweep_closes_backpressure_stalled_session_without_inactivity() {
    let registry = SessionRegistry::new();
    let store = FakeStore::new();
    let handle = insert_handle_and_session(&registry, &store, 0, true);
    registry.insert(handle.clone()).await;
    registry.mark_stalled(&handle, StallReason::Backpressure).await;

    let mut backpressure_stalled = HashSet::new();
    backpressure_stalled.insert(handle.id);
    sweep_once(&registry, &store, Duration::from_millis(60_000), &mut backpressure_stalled).await;
    assert!(registry.lookup(handle.id).await.is_none());
}

#[test]
fn respond_echoes_timestamp() {
    let msg = respond(42);
    match msg {
        ServerMessage::HeartbeatResponse { timestamp } => assert_eq!(timestamp, 42),
        other => panic!("unexpected response: {other:?}"),
    }
}
