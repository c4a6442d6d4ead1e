// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth Gate (spec.md §4.2): resolves the bearer token presented at socket
//! upgrade to `(agentId, sessionId, ok)`.
//!
//! The wire contract (spec.md §6) only carries `?token=<opaque>&provider=<tag>`
//! — no separate session id. The opaque token is `"<sessionId>.<secret>"`;
//! this layer splits it to find which row to look up but never interprets
//! the secret half itself beyond a constant-time comparison, so it stays
//! "opaque" in the sense the spec means: the client never needs to know or
//! produce anything but the single string it was issued at login.

use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{AgentId, Session, SessionId};
use crate::store::Store;

/// The identity a successful [`validate`] call resolves to.
#[derive(Debug, Clone)]
pub struct Identity {
    pub agent_id: AgentId,
    pub session_id: SessionId,
    pub provider: String,
    pub sync_group: String,
}

/// Constant-time string comparison so a bearer token mismatch cannot be
/// distinguished from a match by timing.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Split `"<sessionId>.<secret>"` into its parts. Malformed tokens (no
/// separator, or a non-UUID session half) yield `None`.
fn split_token(token: &str) -> Option<(SessionId, &str)> {
    let (id, secret) = token.split_once('.')?;
    let session_id = Uuid::parse_str(id).ok()?;
    Some((session_id, secret))
}

/// `Validate(token) → (agentId, sessionId, ok)`, per spec.md §4.2. Empty,
/// malformed, or unknown tokens fail with `invalid_token` — never
/// `session_invalid`, which is reserved for mid-session revalidation
/// (heartbeat reaper). Successful validation does not mutate state.
pub async fn validate(store: &dyn Store, token: &str, provider: &str) -> Result<Identity, CoreError> {
    let (session_id, secret) = split_token(token).ok_or(CoreError::InvalidToken)?;

    let session = store.validate_session(session_id).await.map_err(|_| CoreError::InvalidToken)?;

    if !constant_time_eq(secret, &session.bearer_token) || session.provider != provider {
        return Err(CoreError::InvalidToken);
    }
    if !session.is_valid(chrono::Utc::now()) {
        return Err(CoreError::InvalidToken);
    }

    Ok(Identity {
        agent_id: session.agent_id,
        session_id: session.id,
        provider: session.provider,
        sync_group: session.sync_group,
    })
}

/// Re-validate an already-registered session against the store, per spec.md
/// §4.3 (`stalled → closed` transition on failed revalidation). Unlike
/// [`validate`], a failure here surfaces as `session_invalid` since the
/// caller already trusts the session id — only its continued validity is in
/// question.
pub async fn revalidate(store: &dyn Store, session_id: SessionId) -> Result<Session, CoreError> {
    let session = store.validate_session(session_id).await.map_err(|_| CoreError::SessionInvalid)?;
    if !session.is_valid(chrono::Utc::now()) {
        return Err(CoreError::SessionInvalid);
    }
    Ok(session)
}

/// Parse the `token` and `provider` query parameters off a raw WebSocket
/// upgrade query string, e.g. `token=<sessionId>.<secret>&provider=anonymous`.
pub fn parse_upgrade_query(query: &str) -> Option<(String, String)> {
    let mut token = None;
    let mut provider = None;

    for pair in query.split('&') {
        let (key, value) = pair.split_once('=')?;
        match key {
            "token" => token = Some(value.to_owned()),
            "provider" => provider = Some(value.to_owned()),
            _ => {}
        }
    }

    Some((token?, provider?))
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
