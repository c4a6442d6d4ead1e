// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use tokio_util::sync::CancellationToken;

use crate::config::{CoreConfig, SyncGroupConfigFile};
use crate::state::CoreState;
use crate::store::fake::FakeStore;

fn test_config() -> CoreConfig {
    CoreConfig {
        host: "127.0.0.1".into(),
        port: 0,
        database_url: "postgres://unused".into(),
        sync_group_config: std::path::PathBuf::new(),
        heartbeat_inactivity_ms: 30_000,
        reaper_interval_ms: 1_000,
        query_timeout_ms: 5_000,
        socket_write_timeout_ms: 10_000,
        outbound_queue_capacity: 256,
        session_duration_ms: 86_400_000,
        query_max_rows: 10_000,
    }
}

#[tokio::test]
async fn health_reports_zero_sessions_when_empty() {
    let store = Arc::new(FakeStore::new());
    let state = Arc::new(CoreState::new(
        test_config(),
        SyncGroupConfigFile::default(),
        store,
        CancellationToken::new(),
    ));

    let response = super::health(State(state)).await;
    assert_eq!(response.0.status, "running");
    assert_eq!(response.0.session_count, 0);
}
