// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Query Executor (spec.md §4.7): validated, timed, agent-scoped arbitrary
//! query execution.
//!
//! Grounded on the teacher's `UpstreamClient::get_status`/`get_screen`
//! (`upstream/client.rs`), which wraps an outbound call in a timeout and
//! maps failure to a typed error — generalized here to `Store::execute_as`
//! under a configurable deadline with response-size clamping.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::CoreError;
use crate::protocol::ServerMessage;
use crate::registry::{SessionHandle, SessionState};
use crate::store::Store;

/// Execute `query`/`parameters` as `handle`'s agent, honoring `timeout` and
/// `max_rows` (spec.md §4.7). Always returns a correlated `QueryResponse` —
/// errors are carried in the message's `errorMessage` field rather than
/// propagated, since a bad query must never take down the session.
pub async fn execute(
    store: &dyn Store,
    handle: &Arc<SessionHandle>,
    request_id: Option<Uuid>,
    query: &str,
    parameters: &[serde_json::Value],
    timeout: Duration,
    max_rows: usize,
) -> ServerMessage {
    if !is_eligible(handle.state().await) {
        return error_response(request_id, CoreError::SessionInvalid.to_string());
    }

    // Receiving a query_request bumps last_seen regardless of outcome
    // (spec.md §4.7) — a session issuing queries that time out or get
    // clamped is still an active session, not one the reaper should reap.
    let _ = store.touch_session(handle.id).await;
    handle.touch();

    let result = tokio::time::timeout(timeout, store.execute_as(&handle.agent_id, query, parameters)).await;

    let rows = match result {
        Ok(Ok(rows)) => rows,
        Ok(Err(err)) => return error_response(request_id, err.to_string()),
        Err(_) => return error_response(request_id, "query timed out".to_owned()),
    };

    if rows.len() > max_rows {
        return error_response(
            request_id,
            format!("result exceeded max_rows ({max_rows}); clamp your query"),
        );
    }

    ServerMessage::QueryResponse { request_id, result: rows, error_message: None }
}

fn error_response(request_id: Option<Uuid>, message: String) -> ServerMessage {
    ServerMessage::QueryResponse { request_id, result: vec![], error_message: Some(message) }
}

/// Build the schema-failure response for a `query_request` that couldn't be
/// parsed at all (spec.md §4.7 step 1 — carries the original request id when
/// one could be recovered, `None` otherwise).
pub fn schema_violation_response(request_id: Option<Uuid>) -> ServerMessage {
    ServerMessage::ErrorResponse { message: CoreError::SchemaViolation.to_string(), request_id }
}

/// Whether `handle` is still eligible to have a query executed under it
/// (spec.md §4.7 step 2: absent/stalled sessions get `session_invalid`).
pub fn is_eligible(state: SessionState) -> bool {
    !matches!(state, SessionState::Stalled | SessionState::Closed)
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
