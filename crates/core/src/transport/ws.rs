// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket upgrade + per-connection steady-state loop, spec.md §6.
//!
//! Data flow: upgrade -> [`auth::validate`] -> [`CoreState::registry`] insert
//! -> [`keyframe::build`] push -> steady state (client `query_request`s
//! answered here; server-pushed tick updates arrive on `handle.outbound` via
//! the Tick Scheduler + Fan-out Router and are drained by
//! [`delivery::run_writer`]) -> registry removal on close.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{RawQuery, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use uuid::Uuid;

use crate::auth;
use crate::delivery::{self, OutboundQueue};
use crate::heartbeat;
use crate::keyframe;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::query;
use crate::registry::{SessionHandle, SessionState};
use crate::state::CoreState;

/// `GET /ws?token=<opaque>&provider=<tag>` — socket upgrade, spec.md §6. On
/// failure the upgrade never completes and the client sees plain HTTP 401.
pub async fn ws_handler(
    State(state): State<Arc<CoreState>>,
    RawQuery(query_string): RawQuery,
    ws: WebSocketUpgrade,
) -> Response {
    let query_string = query_string.unwrap_or_default();
    let Some((token, provider)) = auth::parse_upgrade_query(&query_string) else {
        return crate::error::CoreError::InvalidToken.into_response();
    };

    let identity = match auth::validate(&*state.store, &token, &provider).await {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(state, identity, token, socket)).into_response()
}

/// Per-connection lifecycle: register, push the connection-established and
/// keyframe messages, then run the steady-state read loop until the socket
/// closes, errors, or the session is cancelled by the reaper.
async fn handle_socket(state: Arc<CoreState>, identity: auth::Identity, token: String, socket: WebSocket) {
    let outbound = Arc::new(OutboundQueue::new(state.config.outbound_queue_capacity));
    let handle = Arc::new(SessionHandle::new(
        identity.session_id,
        identity.agent_id.clone(),
        identity.sync_group.clone(),
        token,
        identity.provider.clone(),
        // A session's sole sync-group membership *is* its read authorization
        // (spec.md §3: a session references exactly one sync group); there
        // is no narrower per-entity ACL at the registry layer — that's the
        // store's `visible_to` check, applied inside `keyframe::build` and
        // the tick diff itself.
        true,
        outbound,
    ));

    // `connection_established_response` is always first (spec.md §6); the
    // queue is fresh and empty so this enqueue cannot fail.
    let _ = handle
        .outbound
        .enqueue(ServerMessage::ConnectionEstablishedResponse { agent_id: handle.agent_id.clone() });

    push_keyframe(&state, &handle, &handle.sync_group.clone()).await;

    state.registry.insert(handle.clone()).await;
    handle.set_state(SessionState::Active).await;

    let (sink, mut stream) = socket.split();
    let writer =
        tokio::spawn(delivery::run_writer(handle.clone(), sink, state.config.socket_write_timeout()));

    loop {
        tokio::select! {
            _ = handle.cancel.cancelled() => break,
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_client_message(&state, &handle, &text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    tracing::debug!(session_id = %handle.id, err = %err, "socket read error, closing session");
                    break;
                }
                _ => {}
            },
        }
    }

    handle.set_state(SessionState::Closed).await;
    state.registry.remove(handle.id).await;
    writer.abort();
}

/// Parse and dispatch one inbound text frame. A frame that fails schema
/// validation gets an `error_response` carrying whatever request id could be
/// recovered from the raw JSON (spec.md §4.7 step 1); the session is kept.
async fn handle_client_message(state: &Arc<CoreState>, handle: &Arc<SessionHandle>, text: &str) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(_) => {
            let request_id = recover_request_id(text);
            let _ = handle.outbound.enqueue(query::schema_violation_response(request_id));
            return;
        }
    };

    handle.touch();

    match msg {
        ClientMessage::HeartbeatRequest { timestamp, .. } => {
            let _ = state.store.touch_session(handle.id).await;
            if handle.is_stalled().await {
                handle.set_state(SessionState::Active).await;
            }
            let _ = handle.outbound.enqueue(heartbeat::respond(timestamp));
        }
        ClientMessage::ClientConfigRequest { .. } => {
            let _ = handle.outbound.enqueue(ServerMessage::ClientConfigResponse { config: client_config(state, handle) });
        }
        ClientMessage::KeyframeRequest { sync_group, .. } => {
            push_keyframe(state, handle, &sync_group).await;
        }
        ClientMessage::QueryRequest { query: sql, parameters, request_id, .. } => {
            let response = query::execute(
                &*state.store,
                handle,
                request_id,
                &sql,
                &parameters,
                state.config.query_timeout(),
                state.config.query_max_rows,
            )
            .await;
            let _ = handle.outbound.enqueue(response);
        }
    }
}

/// Build and enqueue the three keyframe messages for `group`, scoped to
/// `handle`'s agent (spec.md §4.9). Failures are logged and surfaced as an
/// `error_response` rather than closing the session.
async fn push_keyframe(state: &Arc<CoreState>, handle: &Arc<SessionHandle>, group: &str) {
    match keyframe::build(&*state.store, group, &handle.agent_id).await {
        Ok(messages) => {
            for msg in messages {
                if let Err(err) = handle.outbound.enqueue(msg) {
                    tracing::warn!(session_id = %handle.id, err = %err, "keyframe enqueue failed");
                }
            }
        }
        Err(err) => {
            tracing::error!(session_id = %handle.id, group, err = %err, "failed to build keyframe");
            let _ =
                handle.outbound.enqueue(ServerMessage::ErrorResponse { message: err.to_string(), request_id: None });
        }
    }
}

/// Best-effort `requestId` recovery from a frame that didn't parse as a
/// known `ClientMessage` variant, so the `schema_violation` response can
/// still be correlated back to the client's request where possible.
fn recover_request_id(text: &str) -> Option<Uuid> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let raw = value.get("requestId")?.as_str()?;
    Uuid::parse_str(raw).ok()
}

/// The `client_config_response` payload: the requesting session's sync-group
/// cadence plus the global query limits it operates under (spec.md §6
/// leaves the exact shape open; this is the ambient config a client needs to
/// pace its own requests).
fn client_config(state: &Arc<CoreState>, handle: &Arc<SessionHandle>) -> serde_json::Value {
    let group = state.sync_groups.get(&handle.sync_group);
    serde_json::json!({
        "syncGroup": handle.sync_group,
        "tickRateMs": group.map(|g| g.tick_rate_ms),
        "maxBufferedTicks": group.map(|g| g.max_buffered_ticks),
        "queryTimeoutMs": state.config.query_timeout_ms,
        "queryMaxRows": state.config.query_max_rows,
    })
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
