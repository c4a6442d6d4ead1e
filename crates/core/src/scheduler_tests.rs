// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::SyncGroupSettings;
use crate::model::Entity;
use crate::registry::SessionRegistry;
use crate::store::fake::FakeStore;
use std::time::Duration as StdDuration;

fn entity(group: &str, id: &str, version: i64) -> Entity {
    Entity {
        id: id.into(),
        sync_group: group.into(),
        name: id.into(),
        version,
        metadata: serde_json::json!({}),
        script_names: vec![],
        asset_names: vec![],
        load_priority: 0,
    }
}

fn settings() -> SyncGroupSettings {
    SyncGroupSettings { tick_rate_ms: 50, max_buffered_ticks: 8 }
}

fn scheduler(store: Arc<dyn Store>) -> TickScheduler {
    let registry = Arc::new(SessionRegistry::new());
    let router = Arc::new(FanoutRouter::new(registry));
    TickScheduler::new("g", settings(), store, router)
}

#[tokio::test]
async fn first_fire_with_no_prior_tick_diffs_against_empty() {
    let store = Arc::new(FakeStore::new());
    store.put_entity(entity("g", "e1", 1));
    let sched = scheduler(store.clone());

    let (tick_id, diff) = sched.fire_once(None).await.expect("fire_once");
    assert_eq!(diff.metadata.tick_number, 1);
    assert_eq!(diff.entities.len(), 1);
    assert_eq!(diff.entities[0].entity_id, "e1");
    assert_eq!(diff.entities[0].operation, crate::model::ChangeOp::Insert);
    assert!(store.latest_tick_id("g").await.unwrap().map(|id| id == tick_id).unwrap_or(false));
}

#[tokio::test]
async fn subsequent_fire_diffs_against_previous_tick_only() {
    let store = Arc::new(FakeStore::new());
    store.put_entity(entity("g", "e1", 1));
    let sched = scheduler(store.clone());

    let (first_tick, _) = sched.fire_once(None).await.expect("first fire_once");

    store.put_entity(entity("g", "e1", 2));
    let (_, diff) = sched.fire_once(Some(first_tick)).await.expect("second fire_once");

    assert_eq!(diff.metadata.tick_number, 2);
    assert_eq!(diff.entities.len(), 1);
    assert_eq!(diff.entities[0].operation, crate::model::ChangeOp::Update);
}

#[tokio::test]
async fn fire_once_is_empty_when_nothing_changed() {
    let store = Arc::new(FakeStore::new());
    store.put_entity(entity("g", "e1", 1));
    let sched = scheduler(store.clone());

    let (first_tick, _) = sched.fire_once(None).await.expect("first fire_once");
    let (_, diff) = sched.fire_once(Some(first_tick)).await.expect("second fire_once");

    assert!(diff.is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_fires_one_tick_per_rate_interval_without_gaps() {
    let store = Arc::new(FakeStore::new());
    store.put_entity(entity("g", "e1", 1));
    let sched = scheduler(store.clone());

    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = tokio::spawn(sched.run(cancel.clone()));

    // Let the task register its first timer before advancing the clock.
    tokio::task::yield_now().await;

    // Rate is 50ms; four full intervals must produce exactly four ticks,
    // numbered contiguously (spec.md §4.4/§8 scenario 3: no skips).
    tokio::time::advance(StdDuration::from_millis(50 * 4 + 5)).await;
    tokio::task::yield_now().await;

    assert_eq!(store.latest_tick_number("g"), Some(4));

    cancel.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn spawn_all_creates_one_task_per_configured_group() {
    let mut groups = std::collections::HashMap::new();
    groups.insert("a".to_string(), settings());
    groups.insert("b".to_string(), settings());

    let store: Arc<dyn Store> = Arc::new(FakeStore::new());
    let registry = Arc::new(SessionRegistry::new());
    let router = Arc::new(FanoutRouter::new(registry));
    let cancel = tokio_util::sync::CancellationToken::new();

    let tasks = spawn_all(&groups, store, router, cancel.clone());
    assert_eq!(tasks.len(), 2);

    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
}
