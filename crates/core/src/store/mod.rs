// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store Gateway (spec.md §4.1): the typed interface over the authoritative
//! relational store.
//!
//! `Store` is a trait rather than a concrete type so tests can substitute an
//! in-memory fake (`fake::FakeStore`) for the `sqlx::PgPool`-backed
//! `pg::PgStore` — the same "construct fresh per call, easy to swap" shape
//! the teacher's `UpstreamClient` has (see DESIGN.md).

pub mod diff;
pub mod fake;
pub mod pg;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::SyncGroupSettings;
use crate::error::CoreError;
use crate::model::{Asset, Entity, Script, Session, Tick};

/// Typed interface over the authoritative relational store, spec.md §4.1.
#[async_trait]
pub trait Store: Send + Sync {
    /// Capture a new tick for `group`: install the advisory lock, insert the
    /// next tick row, copy current rows into the snapshot tables, evict rows
    /// beyond `settings.max_buffered_ticks`, and notify `tick_captured` on
    /// commit.
    async fn capture_tick(
        &self,
        group: &str,
        settings: &SyncGroupSettings,
    ) -> Result<Tick, CoreError>;

    /// Entity rows captured at `tick_id`.
    async fn fetch_entity_snapshot(&self, group: &str, tick_id: Uuid) -> Result<Vec<Entity>, CoreError>;
    /// Script rows captured at `tick_id`.
    async fn fetch_script_snapshot(&self, group: &str, tick_id: Uuid) -> Result<Vec<Script>, CoreError>;
    /// Asset rows captured at `tick_id`.
    async fn fetch_asset_snapshot(&self, group: &str, tick_id: Uuid) -> Result<Vec<Asset>, CoreError>;

    /// All entities/scripts/assets in `group` currently visible to
    /// `agent_id`, read inside a single transaction so the three sets are
    /// consistent as of one point in time (spec.md §4.9 — writes landing
    /// between three independent reads could otherwise leave an entity
    /// referencing a script the scripts keyframe no longer includes).
    async fn keyframe(
        &self,
        group: &str,
        agent_id: &str,
    ) -> Result<(Vec<Entity>, Vec<Script>, Vec<Asset>), CoreError>;

    /// Execute `sql`/`params` inside a transaction that first sets the
    /// acting agent id, per spec.md §4.1/§9 ("impossible to issue a query
    /// outside such a transaction").
    async fn execute_as(
        &self,
        agent_id: &str,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<Vec<serde_json::Value>, CoreError>;

    /// `(agentId, valid, token)` for `session_id`, per spec.md §4.2.
    async fn validate_session(&self, session_id: Uuid) -> Result<Session, CoreError>;

    /// Bump `last_seen_at` for a session (spec.md §4.7 "side effect").
    async fn touch_session(&self, session_id: Uuid) -> Result<(), CoreError>;

    /// The most recently captured tick id for `group`, if any has ever been
    /// captured. Used by the scheduler to recover `prevTickId` on start
    /// (spec.md §4.4 "recovers its prevTickId from the store on start").
    async fn latest_tick_id(&self, group: &str) -> Result<Option<Uuid>, CoreError>;
}

/// `DiffEntities`: fetch both snapshots and diff them field-by-field
/// (spec.md §4.1, field-level per the §9 decision). Implemented as a free
/// function over any `Store` rather than a trait method, since the diff
/// itself is pure and the spec explicitly allows pushing diff logic
/// client-side (spec.md §6).
pub async fn diff_entities(
    store: &dyn Store,
    group: &str,
    from_tick: Uuid,
    to_tick: Uuid,
) -> Result<Vec<crate::model::EntityChange>, CoreError> {
    let from = store.fetch_entity_snapshot(group, from_tick).await?;
    let to = store.fetch_entity_snapshot(group, to_tick).await?;
    Ok(diff::diff_entities(from, to))
}

/// `DiffScripts`, analogous to `diff_entities`.
pub async fn diff_scripts(
    store: &dyn Store,
    group: &str,
    from_tick: Uuid,
    to_tick: Uuid,
) -> Result<Vec<crate::model::ScriptChange>, CoreError> {
    let from = store.fetch_script_snapshot(group, from_tick).await?;
    let to = store.fetch_script_snapshot(group, to_tick).await?;
    Ok(diff::diff_scripts(from, to))
}

/// `DiffAssets`, analogous to `diff_entities`.
pub async fn diff_assets(
    store: &dyn Store,
    group: &str,
    from_tick: Uuid,
    to_tick: Uuid,
) -> Result<Vec<crate::model::AssetChange>, CoreError> {
    let from = store.fetch_asset_snapshot(group, from_tick).await?;
    let to = store.fetch_asset_snapshot(group, to_tick).await?;
    Ok(diff::diff_assets(from, to))
}
