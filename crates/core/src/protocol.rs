// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol for the client↔server socket, per spec.md §6.
//!
//! Tagged-enum shape follows the teacher's `MuxEvent`
//! (`#[serde(tag = "type", rename_all = "snake_case")]` in `state.rs`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{AssetChange, Entity, EntityChange, Script, ScriptChange, TickMetadata};

/// Messages a client may send over the socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    HeartbeatRequest {
        timestamp: i64,
        #[serde(rename = "requestId", default)]
        request_id: Option<Uuid>,
    },
    ClientConfigRequest {
        timestamp: i64,
        #[serde(rename = "requestId", default)]
        request_id: Option<Uuid>,
    },
    KeyframeRequest {
        timestamp: i64,
        #[serde(rename = "requestId", default)]
        request_id: Option<Uuid>,
        #[serde(rename = "syncGroup")]
        sync_group: String,
    },
    QueryRequest {
        timestamp: i64,
        #[serde(rename = "requestId", default)]
        request_id: Option<Uuid>,
        query: String,
        #[serde(default)]
        parameters: Vec<serde_json::Value>,
    },
}

impl ClientMessage {
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            Self::HeartbeatRequest { request_id, .. }
            | Self::ClientConfigRequest { request_id, .. }
            | Self::KeyframeRequest { request_id, .. }
            | Self::QueryRequest { request_id, .. } => *request_id,
        }
    }
}

/// Messages the server may push over the socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(rename_all_fields = "camelCase")]
pub enum ServerMessage {
    ConnectionEstablishedResponse {
        agent_id: String,
    },
    HeartbeatResponse {
        timestamp: i64,
    },
    ClientConfigResponse {
        config: serde_json::Value,
    },
    KeyframeResponse {
        entities: Vec<Entity>,
    },
    KeyframeEntityScriptsResponse {
        scripts: Vec<Script>,
    },
    KeyframeEntityAssetsResponse {
        assets: Vec<crate::model::Asset>,
    },
    SyncGroupUpdatesResponse {
        tick_metadata: TickMetadata,
        entities: Vec<EntityChange>,
    },
    EntityScriptUpdatesResponse {
        tick_metadata: TickMetadata,
        scripts: Vec<ScriptChange>,
    },
    EntityAssetUpdatesResponse {
        tick_metadata: TickMetadata,
        assets: Vec<AssetChange>,
    },
    QueryResponse {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
        result: Vec<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
    ErrorResponse {
        message: String,
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
    },
}

impl ServerMessage {
    /// Critical messages are never dropped under backpressure, per spec.md
    /// §4.6/GLOSSARY: heartbeat responses, keyframes, error responses. The
    /// one-time `connection_established_response` is treated as critical too
    /// — it is always the first message on an empty queue, but dropping it
    /// would desynchronize the client permanently (see DESIGN.md).
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::ConnectionEstablishedResponse { .. }
                | Self::HeartbeatResponse { .. }
                | Self::KeyframeResponse { .. }
                | Self::KeyframeEntityScriptsResponse { .. }
                | Self::KeyframeEntityAssetsResponse { .. }
                | Self::ErrorResponse { .. }
        )
    }

    /// The tick number this message is ordered by, if any. Used to enforce
    /// the strictly-increasing-tick-number ordering guarantee (spec.md §4.5).
    pub fn tick_number(&self) -> Option<i64> {
        match self {
            Self::SyncGroupUpdatesResponse { tick_metadata, .. }
            | Self::EntityScriptUpdatesResponse { tick_metadata, .. }
            | Self::EntityAssetUpdatesResponse { tick_metadata, .. } => {
                Some(tick_metadata.tick_number)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
