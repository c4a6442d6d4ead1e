// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory `Store` double used by unit tests for the scheduler, fan-out
//! router, query executor, keyframe builder, and auth gate — none of which
//! need a live Postgres instance to exercise their own logic.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::SyncGroupSettings;
use crate::error::CoreError;
use crate::model::{Asset, Entity, Script, Session, Tick};

use super::diff;
use super::Store;

type QueryHandler = Box<dyn Fn(&str, &[serde_json::Value]) -> Vec<serde_json::Value> + Send + Sync>;

struct TickRecord {
    tick: Tick,
    entities: Vec<Entity>,
    scripts: Vec<Script>,
    assets: Vec<Asset>,
}

#[derive(Default)]
struct Inner {
    entities: HashMap<String, HashMap<String, Entity>>,
    scripts: HashMap<String, HashMap<String, Script>>,
    assets: HashMap<String, HashMap<String, Asset>>,
    sessions: HashMap<Uuid, Session>,
    ticks: HashMap<String, Vec<TickRecord>>,
}

/// In-memory stand-in for [`super::pg::PgStore`]. Construct with
/// [`FakeStore::new`], seed rows with [`FakeStore::put_entity`] and friends,
/// then drive `capture_tick` the same way the scheduler would.
pub struct FakeStore {
    inner: Mutex<Inner>,
    query_handler: Mutex<Option<QueryHandler>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()), query_handler: Mutex::new(None) }
    }

    pub fn put_entity(&self, entity: Entity) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entities.entry(entity.sync_group.clone()).or_default().insert(entity.id.clone(), entity);
    }

    pub fn remove_entity(&self, group: &str, id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(group) = inner.entities.get_mut(group) {
            group.remove(id);
        }
    }

    pub fn put_script(&self, script: Script) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.scripts.entry(script.sync_group.clone()).or_default().insert(script.file_name.clone(), script);
    }

    pub fn put_asset(&self, asset: Asset) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.assets.entry(asset.sync_group.clone()).or_default().insert(asset.file_name.clone(), asset);
    }

    pub fn put_session(&self, session: Session) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.sessions.insert(session.id, session);
    }

    /// Install a handler invoked by `execute_as` for every query, receiving
    /// the raw SQL and bound parameters. Tests that never call `execute_as`
    /// don't need one; the default handler returns no rows.
    pub fn set_query_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &[serde_json::Value]) -> Vec<serde_json::Value> + Send + Sync + 'static,
    {
        *self.query_handler.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(handler));
    }

    /// Convenience for scheduler/fan-out tests: diff the two most recent
    /// captured ticks for `group` directly, without re-fetching by id.
    pub fn latest_entity_diff(&self, group: &str) -> Vec<crate::model::EntityChange> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let records = inner.ticks.get(group).map(|v| v.as_slice()).unwrap_or(&[]);
        match records {
            [.., prev, last] => diff::diff_entities(prev.entities.clone(), last.entities.clone()),
            [only] => diff::diff_entities(vec![], only.entities.clone()),
            [] => vec![],
        }
    }

    /// Convenience for scheduler tests: the tick number of the most recent
    /// capture for `group`, if any.
    pub fn latest_tick_number(&self, group: &str) -> Option<i64> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.ticks.get(group).and_then(|v| v.last()).map(|r| r.tick.tick_number)
    }
}

impl Default for FakeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn capture_tick(&self, group: &str, settings: &SyncGroupSettings) -> Result<Tick, CoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let entities: Vec<Entity> = inner.entities.get(group).cloned().unwrap_or_default().into_values().collect();
        let scripts: Vec<Script> = inner.scripts.get(group).cloned().unwrap_or_default().into_values().collect();
        let assets: Vec<Asset> = inner.assets.get(group).cloned().unwrap_or_default().into_values().collect();

        let records = inner.ticks.entry(group.to_owned()).or_default();
        let tick_number = records.last().map(|r| r.tick.tick_number).unwrap_or(0) + 1;

        let tick = Tick {
            id: Uuid::new_v4(),
            sync_group: group.to_owned(),
            tick_number,
            captured_at: chrono::Utc::now(),
            entity_count: entities.len() as i64,
            script_count: scripts.len() as i64,
            asset_count: assets.len() as i64,
            is_delayed: false,
            headroom_ms: settings.tick_rate_ms as i64,
        };

        records.push(TickRecord { tick: tick.clone(), entities, scripts, assets });
        let keep_from = records.len().saturating_sub(settings.max_buffered_ticks as usize);
        records.drain(..keep_from);

        Ok(tick)
    }

    async fn fetch_entity_snapshot(&self, group: &str, tick_id: Uuid) -> Result<Vec<Entity>, CoreError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        find_record(&inner.ticks, group, tick_id).map(|r| r.entities.clone())
    }

    async fn fetch_script_snapshot(&self, group: &str, tick_id: Uuid) -> Result<Vec<Script>, CoreError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        find_record(&inner.ticks, group, tick_id).map(|r| r.scripts.clone())
    }

    async fn fetch_asset_snapshot(&self, group: &str, tick_id: Uuid) -> Result<Vec<Asset>, CoreError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        find_record(&inner.ticks, group, tick_id).map(|r| r.assets.clone())
    }

    async fn keyframe(
        &self,
        group: &str,
        _agent_id: &str,
    ) -> Result<(Vec<Entity>, Vec<Script>, Vec<Asset>), CoreError> {
        // A single lock acquisition stands in for the real store's single
        // transaction: the three sets are read from one consistent snapshot
        // of `inner`, never interleaved with a concurrent mutation.
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entities = inner.entities.get(group).cloned().unwrap_or_default().into_values().collect();
        let scripts = inner.scripts.get(group).cloned().unwrap_or_default().into_values().collect();
        let assets = inner.assets.get(group).cloned().unwrap_or_default().into_values().collect();
        Ok((entities, scripts, assets))
    }

    async fn execute_as(
        &self,
        _agent_id: &str,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<Vec<serde_json::Value>, CoreError> {
        let handler = self.query_handler.lock().unwrap_or_else(|e| e.into_inner());
        Ok(handler.as_ref().map(|f| f(sql, params)).unwrap_or_default())
    }

    async fn validate_session(&self, session_id: Uuid) -> Result<Session, CoreError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.sessions.get(&session_id).cloned().ok_or(CoreError::SessionInvalid)
    }

    async fn touch_session(&self, session_id: Uuid) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let session = inner.sessions.get_mut(&session_id).ok_or(CoreError::SessionInvalid)?;
        session.last_seen_at = chrono::Utc::now();
        Ok(())
    }

    async fn latest_tick_id(&self, group: &str) -> Result<Option<Uuid>, CoreError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.ticks.get(group).and_then(|v| v.last()).map(|r| r.tick.id))
    }
}

fn find_record<'a>(
    ticks: &'a HashMap<String, Vec<TickRecord>>,
    group: &str,
    tick_id: Uuid,
) -> Result<&'a TickRecord, CoreError> {
    ticks
        .get(group)
        .and_then(|records| records.iter().find(|r| r.tick.id == tick_id))
        .ok_or(CoreError::Internal)
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
