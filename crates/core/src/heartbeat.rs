// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat/Reaper (spec.md §4.8): fixed-interval sweep that revalidates
//! lapsed sessions and closes the ones that fail.
//!
//! Grounded on the teacher's `upstream/health.rs` background health-check
//! loop (`tokio::time::interval` + `CancellationToken`), generalized from
//! "is the upstream reachable" to "is this session still valid per the
//! store".

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::auth;
use crate::model::SessionId;
use crate::protocol::ServerMessage;
use crate::registry::{RegistryEvent, SessionRegistry, SessionState, StallReason};
use crate::store::Store;

/// One heartbeat response for an explicit `heartbeat_request`, per spec.md
/// §4.8: resets `last_seen` and replies immediately.
pub fn respond(timestamp: i64) -> ServerMessage {
    ServerMessage::HeartbeatResponse { timestamp }
}

/// Run the fixed-interval reaper sweep until cancelled. Subscribes to the
/// registry's lifecycle events to learn which stalls came from backpressure
/// (spec.md §7), since that's the only stall cause the sweep force-closes
/// without a failed revalidation.
pub async fn run(
    registry: Arc<SessionRegistry>,
    store: Arc<dyn Store>,
    inactivity_window: Duration,
    sweep_interval: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut events = registry.subscribe();
    let mut backpressure_stalled = HashSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("heartbeat reaper stopping");
                return;
            }
            _ = interval.tick() => {
                sweep_once(&registry, &*store, inactivity_window, &mut backpressure_stalled).await;
            }
            event = events.recv() => {
                match event {
                    Ok(RegistryEvent::Stalled(id, StallReason::Backpressure)) => {
                        backpressure_stalled.insert(id);
                    }
                    Ok(RegistryEvent::Closed(id)) => {
                        backpressure_stalled.remove(&id);
                    }
                    Ok(RegistryEvent::Stalled(_, StallReason::Inactivity)) | Ok(RegistryEvent::Connected(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // A few backpressure stalls may go untracked until
                        // the next one for the same session; sweep_once still
                        // catches genuinely-dead sessions via revalidation.
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}

/// One reaper pass: close every session whose `last_seen` has lapsed and
/// which fails revalidation against the store, per spec.md §4.8. Also
/// enforces spec.md §7's backpressure rule — a session `stalled` because its
/// outbound queue rejected a critical message gets exactly one reaper pass
/// of grace, then is force-closed if it hasn't recovered. A session stalled
/// purely from inactivity keeps being revalidated every sweep instead; per
/// spec.md §4.3 it only moves to `closed` when revalidation actually fails.
pub async fn sweep_once(
    registry: &SessionRegistry,
    store: &dyn Store,
    inactivity_window: Duration,
    backpressure_stalled: &mut HashSet<SessionId>,
) {
    let now_ms = crate::model::epoch_ms();
    let window_ms = inactivity_window.as_millis() as i64;

    for handle in registry.snapshot().await {
        let state = handle.state().await;

        if backpressure_stalled.contains(&handle.id) {
            if matches!(state, SessionState::Stalled) {
                tracing::info!(session_id = %handle.id, "backpressure-stalled session still stalled after one reaper pass, closing");
                handle.set_state(SessionState::Closed).await;
                handle.cancel.cancel();
                registry.remove(handle.id).await;
                backpressure_stalled.remove(&handle.id);
                continue;
            }
            // Recovered (heartbeat/send success moved it back to active)
            // before this sweep ran.
            backpressure_stalled.remove(&handle.id);
        }

        let inactive = now_ms - handle.last_seen_ms() > window_ms;
        if !inactive {
            continue;
        }

        if !matches!(state, SessionState::Stalled) {
            registry.mark_stalled(&handle, StallReason::Inactivity).await;
        }

        match auth::revalidate(store, handle.id).await {
            // Still valid in the store; leave it stalled and registered. A
            // `heartbeat_request` moves it back to `active` before the next
            // sweep; otherwise this same check runs again next pass.
            Ok(_) => {}
            Err(_) => {
                tracing::info!(session_id = %handle.id, "session failed revalidation, closing");
                handle.set_state(SessionState::Closed).await;
                handle.cancel.cancel();
                registry.remove(handle.id).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
