// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::fake::FakeStore;
use uuid::Uuid;

fn session(secret: &str, provider: &str, valid: bool) -> Session {
    let now = chrono::Utc::now();
    Session {
        id: Uuid::new_v4(),
        agent_id: "agent-1".into(),
        bearer_token: secret.into(),
        provider: provider.into(),
        sync_group: "public.NORMAL".into(),
        started_at: now,
        last_seen_at: now,
        expires_at: if valid { now + chrono::Duration::hours(1) } else { now - chrono::Duration::hours(1) },
        is_active: valid,
    }
}

#[tokio::test]
async fn validate_succeeds_with_matching_token_and_provider() {
    let store = FakeStore::new();
    let session = session("secret", "anonymous", true);
    let id = session.id;
    store.put_session(session);

    let token = format!("{id}.secret");
    let identity = validate(&store, &token, "anonymous").await.unwrap();
    assert_eq!(identity.agent_id, "agent-1");
    assert_eq!(identity.session_id, id);
}

#[tokio::test]
async fn validate_rejects_wrong_secret() {
    let store = FakeStore::new();
    let session = session("secret", "anonymous", true);
    let id = session.id;
    store.put_session(session);

    let token = format!("{id}.wrong");
    let err = validate(&store, &token, "anonymous").await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidToken));
}

#[tokio::test]
async fn validate_rejects_mismatched_provider() {
    let store = FakeStore::new();
    let session = session("secret", "anonymous", true);
    let id = session.id;
    store.put_session(session);

    let token = format!("{id}.secret");
    let err = validate(&store, &token, "google").await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidToken));
}

#[tokio::test]
async fn validate_rejects_expired_session() {
    let store = FakeStore::new();
    let session = session("secret", "anonymous", false);
    let id = session.id;
    store.put_session(session);

    let token = format!("{id}.secret");
    let err = validate(&store, &token, "anonymous").await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidToken));
}

#[tokio::test]
async fn validate_rejects_unknown_session_id() {
    let store = FakeStore::new();
    let token = format!("{}.secret", Uuid::new_v4());
    let err = validate(&store, &token, "anonymous").await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidToken));
}

#[tokio::test]
async fn validate_rejects_malformed_token() {
    let store = FakeStore::new();
    let err = validate(&store, "not-a-valid-token", "anonymous").await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidToken));
}

#[tokio::test]
async fn revalidate_surfaces_session_invalid_after_expiry() {
    let store = FakeStore::new();
    let session = session("secret", "anonymous", false);
    let id = session.id;
    store.put_session(session);

    let err = revalidate(&store, id).await.unwrap_err();
    assert!(matches!(err, CoreError::SessionInvalid));
}

#[test]
fn parse_upgrade_query_extracts_token_and_provider() {
    let id = Uuid::new_v4();
    let query = format!("token={id}.abc123&provider=anonymous");
    let (token, provider) = parse_upgrade_query(&query).unwrap();
    assert_eq!(token, format!("{id}.abc123"));
    assert_eq!(provider, "anonymous");
}

#[test]
fn parse_upgrade_query_rejects_missing_field() {
    let query = "token=abc123";
    assert!(parse_upgrade_query(query).is_none());
}

#[test]
fn split_token_rejects_non_uuid_session_half() {
    assert!(split_token("not-a-uuid.secret").is_none());
}
