// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Registry (spec.md §4.3): in-memory directory of live sessions.
//!
//! Grounded on the teacher's `MuxState.sessions: RwLock<HashMap<String,
//! Arc<SessionEntry>>>` (`state.rs`) and `WsBridge`'s per-client `ClientSlot`
//! map (`upstream/bridge.rs`), generalized to the session state machine and
//! permission-scoped fan-out lookups spec.md §4.3/§4.5 require.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::delivery::OutboundQueue;
use crate::model::{epoch_ms, AgentId, SessionId, SyncGroupName};

/// Per-session state machine, per spec.md §4.3:
/// `new → connected → (active ↔ stalled) → closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Active,
    Stalled,
    Closed,
}

/// Internal lifecycle event, published so other subsystems (heartbeat/reaper,
/// delivery) can react to session transitions without polling the whole
/// registry. Purely in-process; no externally-visible wire effect (see
/// SPEC_FULL.md §4.10).
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Connected(SessionId),
    Stalled(SessionId, StallReason),
    Closed(SessionId),
}

/// Why a session transitioned into `Stalled`, per spec.md §4.3. The reaper
/// only force-closes a session with no failed revalidation when the stall
/// came from backpressure; an inactivity stall keeps being revalidated every
/// sweep and only closes if revalidation actually fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallReason {
    /// The session missed the inactivity window; last_seen just went stale.
    Inactivity,
    /// The outbound queue rejected a critical message (fan-out backpressure).
    Backpressure,
}

/// A live session: socket handle (via its outbound queue), identity, and
/// bookkeeping. Owned exclusively by the Session Registry; the Fan-out
/// Router only ever holds a `SessionId` and re-looks-up the handle per tick
/// (spec.md §3 "weak references" ownership note).
pub struct SessionHandle {
    pub id: SessionId,
    pub agent_id: AgentId,
    pub sync_group: SyncGroupName,
    pub bearer_token: String,
    pub provider: String,
    /// Bounded outbound queue drained by the Delivery Pipeline (spec.md §3).
    pub outbound: Arc<OutboundQueue>,
    /// Whether this session is authorized to receive sync-group updates.
    /// Resolved once at registration from the agent's role/ACL; re-derived
    /// per spec.md §4.5 "sync group membership and permission flags".
    pub can_read: bool,
    last_seen_ms: AtomicI64,
    state: RwLock<SessionState>,
    pub cancel: CancellationToken,
}

impl SessionHandle {
    pub fn new(
        id: SessionId,
        agent_id: AgentId,
        sync_group: SyncGroupName,
        bearer_token: String,
        provider: String,
        can_read: bool,
        outbound: Arc<OutboundQueue>,
    ) -> Self {
        Self {
            id,
            agent_id,
            sync_group,
            bearer_token,
            provider,
            outbound,
            can_read,
            last_seen_ms: AtomicI64::new(epoch_ms()),
            state: RwLock::new(SessionState::Connected),
            cancel: CancellationToken::new(),
        }
    }

    /// Atomic `last_seen` update (spec.md §5: "last_seen updates are atomic").
    pub fn touch(&self) {
        self.last_seen_ms.store(epoch_ms(), Ordering::Relaxed);
    }

    pub fn last_seen_ms(&self) -> i64 {
        self.last_seen_ms.load(Ordering::Relaxed)
    }

    /// Force `last_seen` to an explicit value, bypassing "now". Used by
    /// tests to simulate elapsed inactivity without sleeping real time.
    #[doc(hidden)]
    pub fn force_last_seen_ms(&self, ms: i64) {
        self.last_seen_ms.store(ms, Ordering::Relaxed);
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn set_state(&self, next: SessionState) {
        *self.state.write().await = next;
    }

    pub async fn is_stalled(&self) -> bool {
        matches!(self.state().await, SessionState::Stalled)
    }
}

/// O(|sessions in group|) directory of live sessions, per spec.md §4.3.
/// Concurrent reads (fan-out, delivery) never serialize behind a writer for
/// longer than it takes to publish a single `Arc` into the map.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    events_tx: broadcast::Sender<RegistryEvent>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self { sessions: RwLock::new(HashMap::new()), events_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events_tx.subscribe()
    }

    pub async fn insert(&self, handle: Arc<SessionHandle>) {
        let id = handle.id;
        self.sessions.write().await.insert(id, handle);
        let _ = self.events_tx.send(RegistryEvent::Connected(id));
    }

    pub async fn lookup(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Transition `handle` to `Stalled` and publish why, so a subscriber
    /// (the reaper) can tell a backpressure stall from an inactivity one
    /// without re-deriving it from queue state later.
    pub async fn mark_stalled(&self, handle: &Arc<SessionHandle>, reason: StallReason) {
        handle.set_state(SessionState::Stalled).await;
        let _ = self.events_tx.send(RegistryEvent::Stalled(handle.id, reason));
    }

    /// Remove a session; the handle's `cancel` token stops its writer task,
    /// and the `Arc<SessionHandle>` (with its `OutboundQueue`) is dropped
    /// once the last reference goes away.
    pub async fn remove(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.write().await.remove(&id);
        if let Some(ref handle) = removed {
            handle.cancel.cancel();
            let _ = self.events_tx.send(RegistryEvent::Closed(id));
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Invoke `f` for every session in `group`. Used by the reaper and by
    /// diagnostics; the hot fan-out path uses `sessions_permitted` instead.
    pub async fn for_each_in_sync_group<F: FnMut(&Arc<SessionHandle>)>(
        &self,
        group: &str,
        mut f: F,
    ) {
        let guard = self.sessions.read().await;
        for handle in guard.values().filter(|h| h.sync_group == group) {
            f(handle);
        }
    }

    /// Session ids authorized to receive reads for `group` — the Fan-out
    /// Router's hot path (spec.md §4.3). One read-lock acquisition, O(n).
    pub async fn sessions_permitted_for_read(&self, group: &str) -> Vec<SessionId> {
        let guard = self.sessions.read().await;
        guard
            .values()
            .filter(|h| h.sync_group == group && h.can_read)
            .map(|h| h.id)
            .collect()
    }

    /// Snapshot of all session handles (used by the reaper sweep, which must
    /// revalidate outside the registry lock).
    pub async fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.read().await.values().cloned().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
