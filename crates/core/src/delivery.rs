// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery Pipeline (spec.md §4.6): one writer per session draining its
//! outbound queue to the socket in FIFO order.
//!
//! [`OutboundQueue`] replaces a plain bounded `mpsc` channel because the
//! drop-oldest-non-critical overflow policy needs to reach into the queue
//! and remove an already-enqueued message, something a channel's `Sender`
//! cannot do. Grounded on the teacher's per-client queue shape in
//! `upstream/bridge.rs` (`WsBridge`'s per-slot outbound channel), adapted
//! from an opaque mpsc to an inspectable deque.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::Notify;

use crate::error::CoreError;
use crate::protocol::ServerMessage;
use crate::registry::{SessionHandle, SessionState};

/// Bounded FIFO of outbound messages with drop-oldest-non-critical
/// backpressure (spec.md §4.6).
pub struct OutboundQueue {
    inner: Mutex<VecDeque<ServerMessage>>,
    capacity: usize,
    notify: Notify,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self { inner: Mutex::new(VecDeque::with_capacity(capacity)), capacity, notify: Notify::new() }
    }

    /// Enqueue `msg`. If the queue is at capacity, drop the oldest
    /// non-critical message to make room. If every queued message is
    /// critical (heartbeat responses, keyframes, errors), the new message
    /// is rejected with `Backpressure` — the caller marks the session
    /// `stalled` and eligible for close (spec.md §4.6).
    pub fn enqueue(&self, msg: ServerMessage) -> Result<(), CoreError> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if guard.len() >= self.capacity {
            match guard.iter().position(|queued| !queued.is_critical()) {
                Some(pos) => {
                    guard.remove(pos);
                }
                None => return Err(CoreError::Backpressure),
            }
        }
        guard.push_back(msg);
        drop(guard);
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for and remove the oldest message. Cooperates with concurrent
    /// `enqueue` calls via a `Notify` permit, so a wakeup racing a drain
    /// never deadlocks the writer.
    pub async fn dequeue(&self) -> ServerMessage {
        loop {
            if let Some(msg) = self.inner.lock().unwrap_or_else(|e| e.into_inner()).pop_front() {
                return msg;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs for the lifetime of one session: drains `handle.outbound` to `sink`
/// in FIFO order until the socket errors or the session is cancelled. A
/// transport write failure or a write that exceeds `write_timeout` (spec.md
/// §5 socket write timeout, default 10s) marks the session `closed`
/// (spec.md §4.6).
pub async fn run_writer(
    handle: std::sync::Arc<SessionHandle>,
    mut sink: SplitSink<WebSocket, Message>,
    write_timeout: Duration,
) {
    loop {
        let msg = tokio::select! {
            _ = handle.cancel.cancelled() => {
                // Every cancellation this implementation produces — reaper
                // eviction, server shutdown — is a normal closure (spec.md
                // §6); a future variant that needs a different code should
                // set it on the handle before cancelling rather than here.
                let frame = CoreError::SessionInvalid.to_close_frame("session closed");
                let _ = tokio::time::timeout(write_timeout, sink.send(frame)).await;
                break;
            }
            msg = handle.outbound.dequeue() => msg,
        };

        let encoded = match serde_json::to_string(&msg) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!(session_id = %handle.id, err = %err, "failed to encode outbound message");
                continue;
            }
        };

        match tokio::time::timeout(write_timeout, sink.send(Message::Text(encoded.into()))).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(session_id = %handle.id, err = %err, "delivery write failed, closing session");
                handle.set_state(SessionState::Closed).await;
                break;
            }
            Err(_) => {
                tracing::debug!(session_id = %handle.id, "delivery write timed out, closing session");
                handle.set_state(SessionState::Closed).await;
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;
