// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data model shared by the store gateway, registry, and wire protocol.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AgentId = String;
pub type SessionId = Uuid;
pub type SyncGroupName = String;

/// Well-known agent id for the system principal (used for internal writes).
pub const SYSTEM_AGENT_ID: &str = "system";
/// Well-known agent id for unauthenticated/anonymous sessions.
pub const ANONYMOUS_AGENT_ID: &str = "anonymous";

/// A live or historical session row, per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: SessionId,
    pub agent_id: AgentId,
    pub bearer_token: String,
    pub provider: String,
    pub sync_group: SyncGroupName,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub last_seen_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub is_active: bool,
}

impl Session {
    /// `is_active ∧ now < expires_at`, per spec.md §3 invariant.
    pub fn is_valid(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.is_active && now < self.expires_at
    }
}

/// Static per-sync-group configuration row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncGroup {
    pub name: SyncGroupName,
    pub tick_rate_ms: u64,
    pub max_buffered_ticks: u32,
}

/// An authoritative entity row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Entity {
    pub id: String,
    pub sync_group: SyncGroupName,
    pub name: String,
    pub version: i64,
    pub metadata: serde_json::Value,
    pub script_names: Vec<String>,
    pub asset_names: Vec<String>,
    pub load_priority: i32,
}

/// An authoritative script row. `compile_status` is one of `pending`,
/// `compiling`, `compiled`, `failed` (spec.md §3); this crate never writes
/// it — scripts are compiled and the column transitioned by the authorized
/// writer that owns compilation, out of scope here (spec.md §3 "Created/
/// updated by authorized writers"). The core only ever reads the column
/// back as part of a snapshot or keyframe.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Script {
    pub file_name: String,
    pub sync_group: SyncGroupName,
    pub source_text: String,
    pub compiled_text: Option<String>,
    pub compile_status: String,
}

/// An authoritative asset row. `payload` may be absent during upload.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Asset {
    pub file_name: String,
    pub sync_group: SyncGroupName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
    pub type_tag: String,
}

/// A captured tick row, per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tick {
    pub id: Uuid,
    pub sync_group: SyncGroupName,
    pub tick_number: i64,
    pub captured_at: chrono::DateTime<chrono::Utc>,
    pub entity_count: i64,
    pub script_count: i64,
    pub asset_count: i64,
    pub is_delayed: bool,
    pub headroom_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// A single entity's delta between two ticks. `changes` holds only the
/// fields whose value differs (field-level diff, per spec.md §9 decision).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChange {
    pub entity_id: String,
    pub operation: ChangeOp,
    pub changes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptChange {
    pub file_name: String,
    pub operation: ChangeOp,
    pub changes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetChange {
    pub file_name: String,
    pub operation: ChangeOp,
    pub changes: serde_json::Map<String, serde_json::Value>,
}

/// Metadata attached to every tick-derived push message.
///
/// `capture_ms`/`diff_ms` are the optional manager/db timing splits left
/// open by spec.md §9 — present when the scheduler measured them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickMetadata {
    pub sync_group: SyncGroupName,
    pub tick_id: Uuid,
    pub tick_number: i64,
    pub is_delayed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_ms: Option<u64>,
}

/// The full output of one tick: metadata plus the three diff sets.
#[derive(Debug, Clone)]
pub struct TickDiff {
    pub metadata: TickMetadata,
    pub entities: Vec<EntityChange>,
    pub scripts: Vec<ScriptChange>,
    pub assets: Vec<AssetChange>,
}

impl TickDiff {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.scripts.is_empty() && self.assets.is_empty()
    }
}

/// Current epoch millis, used for wire timestamps and `last_seen` bookkeeping.
pub fn epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
