// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out Router (spec.md §4.5): fans a tick's diff out to every session
//! authorized to read the sync group it belongs to.
//!
//! Grounded on the teacher's `WsBridge::broadcast` (`upstream/bridge.rs`),
//! which likewise resolves a snapshot of recipient handles from a registry
//! and pushes to each independently rather than holding any recipient
//! across an await point — generalized here to per-recipient message
//! shaping (entities/scripts/assets split into three message types) and the
//! strictly-increasing-tick-number ordering guarantee.

use std::sync::Arc;

use crate::model::TickDiff;
use crate::protocol::ServerMessage;
use crate::registry::{SessionRegistry, SessionState, StallReason};

/// Routes tick diffs to authorized sessions. Never retains a `SessionHandle`
/// across a tick boundary — each call re-resolves recipients from the
/// registry by id (spec.md §3 weak-reference note).
pub struct FanoutRouter {
    registry: Arc<SessionRegistry>,
}

impl FanoutRouter {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Fan `diff` out to every session currently authorized to read
    /// `group`. One update per session per tick; a session with no changes
    /// of a given kind simply doesn't receive that message type (spec.md
    /// §4.5 "the message is only emitted when non-empty").
    pub async fn route(&self, group: &str, diff: TickDiff) {
        let recipients = self.registry.sessions_permitted_for_read(group).await;
        if recipients.is_empty() {
            return;
        }

        let entity_msg = (!diff.entities.is_empty()).then(|| ServerMessage::SyncGroupUpdatesResponse {
            tick_metadata: diff.metadata.clone(),
            entities: diff.entities.clone(),
        });
        let script_msg = (!diff.scripts.is_empty()).then(|| ServerMessage::EntityScriptUpdatesResponse {
            tick_metadata: diff.metadata.clone(),
            scripts: diff.scripts.clone(),
        });
        let asset_msg = (!diff.assets.is_empty()).then(|| ServerMessage::EntityAssetUpdatesResponse {
            tick_metadata: diff.metadata.clone(),
            assets: diff.assets.clone(),
        });

        for session_id in recipients {
            let Some(handle) = self.registry.lookup(session_id).await else {
                continue;
            };
            if matches!(handle.state().await, SessionState::Closed) {
                continue;
            }

            for msg in [&entity_msg, &script_msg, &asset_msg].into_iter().flatten() {
                if let Err(err) = handle.outbound.enqueue(msg.clone()) {
                    tracing::warn!(session_id = %handle.id, err = %err, "fan-out enqueue failed, marking stalled");
                    self.registry.mark_stalled(&handle, StallReason::Backpressure).await;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "fanout_tests.rs"]
mod tests;
