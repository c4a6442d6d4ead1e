// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PostgreSQL-backed `Store` implementation.
//!
//! Every operation opens (or reuses, via the pool) a connection and runs in
//! its own transaction; a connection error is retried once with a fresh
//! connection before surfacing `StoreUnavailable` (spec.md §4.1 failure
//! semantics).

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

use crate::config::SyncGroupSettings;
use crate::error::CoreError;
use crate::model::{Asset, Entity, Script, Session, Tick};

use super::Store;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new().max_connections(16).connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Run `f` against a fresh transaction, retrying once on a connection
    /// error with a brand new connection (spec.md §4.1).
    async fn with_retry<T, F, Fut>(&self, f: F) -> Result<T, CoreError>
    where
        F: Fn(PgPool) -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        match f(self.pool.clone()).await {
            Ok(v) => Ok(v),
            Err(first_err) => {
                tracing::debug!(err = %first_err, "store call failed, retrying once");
                f(self.pool.clone()).await.map_err(|second_err| {
                    tracing::error!(err = %second_err, "store call failed after retry");
                    CoreError::StoreUnavailable
                })
            }
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn capture_tick(
        &self,
        group: &str,
        settings: &SyncGroupSettings,
    ) -> Result<Tick, CoreError> {
        let group = group.to_owned();
        let max_buffered = settings.max_buffered_ticks as i64;
        let rate_ms = settings.tick_rate_ms as i64;

        self.with_retry(move |pool| {
            let group = group.clone();
            async move {
                let started = std::time::Instant::now();
                let mut tx = pool.begin().await?;

                // Share-row-exclusive serialization per sync group (spec.md §5).
                sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                    .bind(&group)
                    .execute(&mut *tx)
                    .await?;

                let prev_number: Option<i64> = sqlx::query_scalar(
                    "SELECT tick_number FROM ticks WHERE sync_group = $1 ORDER BY tick_number DESC LIMIT 1",
                )
                .bind(&group)
                .fetch_optional(&mut *tx)
                .await?;
                let next_number = prev_number.unwrap_or(0) + 1;

                let tick_id = Uuid::new_v4();
                sqlx::query(
                    "INSERT INTO ticks (id, sync_group, tick_number, captured_at, entity_count, \
                     script_count, asset_count, is_delayed, headroom_ms) \
                     VALUES ($1, $2, $3, now(), 0, 0, 0, false, 0)",
                )
                .bind(tick_id)
                .bind(&group)
                .bind(next_number)
                .execute(&mut *tx)
                .await?;

                let entity_count: i64 = sqlx::query(
                    "INSERT INTO entity_snapshots (tick_id, entity_id, sync_group, name, version, \
                     metadata, script_names, asset_names, load_priority) \
                     SELECT $1, id, sync_group, name, version, metadata, script_names, asset_names, \
                     load_priority FROM entities WHERE sync_group = $2",
                )
                .bind(tick_id)
                .bind(&group)
                .execute(&mut *tx)
                .await?
                .rows_affected() as i64;

                let script_count: i64 = sqlx::query(
                    "INSERT INTO script_snapshots (tick_id, file_name, sync_group, source_text, \
                     compiled_text, compile_status) \
                     SELECT $1, file_name, sync_group, source_text, compiled_text, compile_status \
                     FROM scripts WHERE sync_group = $2",
                )
                .bind(tick_id)
                .bind(&group)
                .execute(&mut *tx)
                .await?
                .rows_affected() as i64;

                let asset_count: i64 = sqlx::query(
                    "INSERT INTO asset_snapshots (tick_id, file_name, sync_group, payload, type_tag) \
                     SELECT $1, file_name, sync_group, payload, type_tag \
                     FROM assets WHERE sync_group = $2",
                )
                .bind(tick_id)
                .bind(&group)
                .execute(&mut *tx)
                .await?
                .rows_affected() as i64;

                // Evict ticks beyond the buffered-ticks bound; snapshot rows
                // cascade-delete with their tick (spec.md §3).
                sqlx::query(
                    "DELETE FROM ticks WHERE sync_group = $1 AND tick_number <= $2",
                )
                .bind(&group)
                .bind(next_number - max_buffered)
                .execute(&mut *tx)
                .await?;

                let elapsed_ms = started.elapsed().as_millis() as i64;
                let is_delayed = elapsed_ms > rate_ms;
                sqlx::query(
                    "UPDATE ticks SET is_delayed = $1, headroom_ms = $2 WHERE id = $3",
                )
                .bind(is_delayed)
                .bind(rate_ms - elapsed_ms)
                .bind(tick_id)
                .execute(&mut *tx)
                .await?;

                let payload = serde_json::json!({
                    "syncGroup": group,
                    "tickId": tick_id,
                    "tickNumber": next_number,
                })
                .to_string();
                sqlx::query("SELECT pg_notify('tick_captured', $1)")
                    .bind(&payload)
                    .execute(&mut *tx)
                    .await?;

                tx.commit().await?;

                Ok(Tick {
                    id: tick_id,
                    sync_group: group,
                    tick_number: next_number,
                    captured_at: chrono::Utc::now(),
                    entity_count,
                    script_count,
                    asset_count,
                    is_delayed,
                    headroom_ms: rate_ms - elapsed_ms,
                })
            }
        })
        .await
    }

    async fn fetch_entity_snapshot(&self, group: &str, tick_id: Uuid) -> Result<Vec<Entity>, CoreError> {
        let group = group.to_owned();
        self.with_retry(move |pool| {
            let group = group.clone();
            async move {
                sqlx::query_as::<_, Entity>(
                    "SELECT entity_id AS id, sync_group, name, version, metadata, script_names, \
                     asset_names, load_priority FROM entity_snapshots \
                     WHERE tick_id = $1 AND sync_group = $2",
                )
                .bind(tick_id)
                .bind(&group)
                .fetch_all(&pool)
                .await
            }
        })
        .await
    }

    async fn fetch_script_snapshot(&self, group: &str, tick_id: Uuid) -> Result<Vec<Script>, CoreError> {
        let group = group.to_owned();
        self.with_retry(move |pool| {
            let group = group.clone();
            async move {
                sqlx::query_as::<_, Script>(
                    "SELECT file_name, sync_group, source_text, compiled_text, compile_status \
                     FROM script_snapshots WHERE tick_id = $1 AND sync_group = $2",
                )
                .bind(tick_id)
                .bind(&group)
                .fetch_all(&pool)
                .await
            }
        })
        .await
    }

    async fn fetch_asset_snapshot(&self, group: &str, tick_id: Uuid) -> Result<Vec<Asset>, CoreError> {
        let group = group.to_owned();
        self.with_retry(move |pool| {
            let group = group.clone();
            async move {
                sqlx::query_as::<_, Asset>(
                    "SELECT file_name, sync_group, payload, type_tag \
                     FROM asset_snapshots WHERE tick_id = $1 AND sync_group = $2",
                )
                .bind(tick_id)
                .bind(&group)
                .fetch_all(&pool)
                .await
            }
        })
        .await
    }

    async fn keyframe(
        &self,
        group: &str,
        agent_id: &str,
    ) -> Result<(Vec<Entity>, Vec<Script>, Vec<Asset>), CoreError> {
        let group = group.to_owned();
        let agent_id = agent_id.to_owned();
        self.with_retry(move |pool| {
            let group = group.clone();
            let agent_id = agent_id.clone();
            async move {
                // One transaction for all three reads so the keyframe is
                // consistent as of a single point in time (spec.md §4.9).
                let mut tx = pool.begin().await?;
                sqlx::query("SELECT set_config('app.current_agent_id', $1, true)")
                    .bind(&agent_id)
                    .execute(&mut *tx)
                    .await?;

                let entities = sqlx::query_as::<_, Entity>(
                    "SELECT id, sync_group, name, version, metadata, script_names, asset_names, \
                     load_priority FROM entities WHERE sync_group = $1 \
                     AND visible_to(sync_group, app_current_agent_id())",
                )
                .bind(&group)
                .fetch_all(&mut *tx)
                .await?;

                let scripts = sqlx::query_as::<_, Script>(
                    "SELECT file_name, sync_group, source_text, compiled_text, compile_status \
                     FROM scripts WHERE sync_group = $1 \
                     AND visible_to(sync_group, app_current_agent_id())",
                )
                .bind(&group)
                .fetch_all(&mut *tx)
                .await?;

                let assets = sqlx::query_as::<_, Asset>(
                    "SELECT file_name, sync_group, payload, type_tag FROM assets \
                     WHERE sync_group = $1 AND visible_to(sync_group, app_current_agent_id())",
                )
                .bind(&group)
                .fetch_all(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok((entities, scripts, assets))
            }
        })
        .await
    }

    async fn execute_as(
        &self,
        agent_id: &str,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<Vec<serde_json::Value>, CoreError> {
        let agent_id = agent_id.to_owned();
        let sql = sql.to_owned();
        let params = params.to_vec();

        self.with_retry(move |pool| {
            let agent_id = agent_id.clone();
            let sql = sql.clone();
            let params = params.clone();
            async move {
                let mut tx = pool.begin().await?;
                sqlx::query("SELECT set_config('app.current_agent_id', $1, true)")
                    .bind(&agent_id)
                    .execute(&mut *tx)
                    .await?;

                let mut query = sqlx::query(&sql);
                for param in &params {
                    query = query.bind(param);
                }
                let rows = query.fetch_all(&mut *tx).await?;

                let mut result = Vec::with_capacity(rows.len());
                for row in &rows {
                    result.push(row_to_json(row));
                }

                tx.commit().await?;
                Ok(result)
            }
        })
        .await
    }

    async fn validate_session(&self, session_id: Uuid) -> Result<Session, CoreError> {
        self.with_retry(move |pool| async move {
            sqlx::query_as::<_, Session>(
                "SELECT id, agent_id, bearer_token, provider, sync_group, started_at, \
                 last_seen_at, expires_at, is_active FROM sessions WHERE id = $1",
            )
            .bind(session_id)
            .fetch_one(&pool)
            .await
        })
        .await
    }

    async fn touch_session(&self, session_id: Uuid) -> Result<(), CoreError> {
        self.with_retry(move |pool| async move {
            sqlx::query("UPDATE sessions SET last_seen_at = now() WHERE id = $1")
                .bind(session_id)
                .execute(&pool)
                .await
                .map(|_| ())
        })
        .await
    }

    async fn latest_tick_id(&self, group: &str) -> Result<Option<Uuid>, CoreError> {
        let group = group.to_owned();
        self.with_retry(move |pool| {
            let group = group.clone();
            async move {
                sqlx::query_scalar(
                    "SELECT id FROM ticks WHERE sync_group = $1 ORDER BY tick_number DESC LIMIT 1",
                )
                .bind(&group)
                .fetch_optional(&pool)
                .await
            }
        })
        .await
    }
}

/// Convert a dynamically-typed Postgres row into a `serde_json::Value`
/// object, used for arbitrary `query_request` results where the column set
/// is not known at compile time.
fn row_to_json(row: &sqlx::postgres::PgRow) -> serde_json::Value {
    use sqlx::{Column, TypeInfo, ValueRef};

    let mut obj = serde_json::Map::new();
    for column in row.columns() {
        let name = column.name();
        let value = match row.try_get_raw(column.ordinal()) {
            Ok(raw) if raw.is_null() => serde_json::Value::Null,
            _ => match column.type_info().name() {
                "INT4" | "INT8" => row
                    .try_get::<i64, _>(column.ordinal())
                    .map(serde_json::Value::from)
                    .unwrap_or(serde_json::Value::Null),
                "FLOAT4" | "FLOAT8" | "NUMERIC" => row
                    .try_get::<f64, _>(column.ordinal())
                    .map(serde_json::Value::from)
                    .unwrap_or(serde_json::Value::Null),
                "BOOL" => row
                    .try_get::<bool, _>(column.ordinal())
                    .map(serde_json::Value::from)
                    .unwrap_or(serde_json::Value::Null),
                "JSON" | "JSONB" => row
                    .try_get::<serde_json::Value, _>(column.ordinal())
                    .unwrap_or(serde_json::Value::Null),
                _ => row
                    .try_get::<String, _>(column.ordinal())
                    .map(serde_json::Value::from)
                    .unwrap_or(serde_json::Value::Null),
            },
        };
        obj.insert(name.to_owned(), value);
    }
    serde_json::Value::Object(obj)
}
