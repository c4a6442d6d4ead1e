// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tick Scheduler (spec.md §4.4): one fixed-cadence loop per sync group.
//!
//! Unlike the screen/status pollers this is grounded on (which use
//! `tokio::time::interval` with `MissedTickBehavior::Skip` and tolerate
//! dropped ticks), a tick number must never be skipped — the loop instead
//! tracks its own deadline and sleeps until it, so an overrun is recorded
//! but the next tick still fires and is numbered correctly.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SyncGroupSettings;
use crate::fanout::FanoutRouter;
use crate::model::{TickDiff, TickMetadata};
use crate::store::{self, Store};

/// Runs the capture/diff/handoff loop for a single sync group until
/// cancelled.
pub struct TickScheduler {
    group: String,
    settings: SyncGroupSettings,
    store: Arc<dyn Store>,
    router: Arc<FanoutRouter>,
}

impl TickScheduler {
    pub fn new(
        group: impl Into<String>,
        settings: SyncGroupSettings,
        store: Arc<dyn Store>,
        router: Arc<FanoutRouter>,
    ) -> Self {
        Self { group: group.into(), settings, store, router }
    }

    /// Run until `cancel` fires. Recovers `prevTickId` from the store on
    /// start (spec.md §4.4 design decision: the DB is the source of truth,
    /// so the two tick cursors never diverge).
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut prev_tick_id = self.store.latest_tick_id(&self.group).await?;
        let rate = self.settings.tick_rate();
        let mut next_deadline = Instant::now() + rate;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(group = %self.group, "tick scheduler stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep_until(next_deadline) => {}
            }

            let fire_started = Instant::now();
            let was_first = prev_tick_id.is_none();
            match self.fire_once(prev_tick_id).await {
                Ok((new_tick_id, diff)) => {
                    prev_tick_id = Some(new_tick_id);
                    if !diff.is_empty() || was_first {
                        self.router.route(&self.group, diff).await;
                    }
                }
                Err(err) => {
                    tracing::error!(group = %self.group, err = %err, "tick capture failed");
                }
            }

            let overran = fire_started.elapsed() > rate;
            if overran {
                tracing::warn!(group = %self.group, "tick capture overran rate_ms");
            }

            // `previous_scheduled + rate_ms`, not `now + rate_ms`, so tick
            // numbers track real-time cadence regardless of jitter.
            next_deadline += rate;
            if next_deadline < Instant::now() {
                next_deadline = Instant::now();
            }
        }
    }

    async fn fire_once(
        &self,
        prev_tick_id: Option<uuid::Uuid>,
    ) -> Result<(uuid::Uuid, TickDiff), crate::error::CoreError> {
        let capture_started = Instant::now();
        let tick = self.store.capture_tick(&self.group, &self.settings).await?;
        let capture_ms = capture_started.elapsed().as_millis() as u64;

        let diff_started = Instant::now();
        let (entities, scripts, assets) = match prev_tick_id {
            Some(from) => (
                store::diff_entities(&*self.store, &self.group, from, tick.id).await?,
                store::diff_scripts(&*self.store, &self.group, from, tick.id).await?,
                store::diff_assets(&*self.store, &self.group, from, tick.id).await?,
            ),
            // First tick since startup: nothing to diff against, so the
            // "diff" is simply the full current state (an implicit insert
            // of everything present). Joining sessions still get a keyframe
            // independently; this only affects already-connected sessions.
            None => (
                store::diff::diff_entities(vec![], self.store.fetch_entity_snapshot(&self.group, tick.id).await?),
                store::diff::diff_scripts(vec![], self.store.fetch_script_snapshot(&self.group, tick.id).await?),
                store::diff::diff_assets(vec![], self.store.fetch_asset_snapshot(&self.group, tick.id).await?),
            ),
        };
        let diff_ms = diff_started.elapsed().as_millis() as u64;

        let metadata = TickMetadata {
            sync_group: self.group.clone(),
            tick_id: tick.id,
            tick_number: tick.tick_number,
            is_delayed: tick.is_delayed,
            capture_ms: Some(capture_ms),
            diff_ms: Some(diff_ms),
        };

        Ok((tick.id, TickDiff { metadata, entities, scripts, assets }))
    }
}

/// Spawn one [`TickScheduler`] per configured sync group, each serialized
/// within itself but running fully in parallel with the others (spec.md
/// §4.4 concurrency note).
pub fn spawn_all(
    groups: &HashMap<String, SyncGroupSettings>,
    store: Arc<dyn Store>,
    router: Arc<FanoutRouter>,
    cancel: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    groups
        .iter()
        .map(|(name, settings)| {
            let scheduler = TickScheduler::new(name.clone(), settings.clone(), store.clone(), router.clone());
            let cancel = cancel.clone();
            let name = name.clone();
            tokio::spawn(async move {
                if let Err(err) = scheduler.run(cancel).await {
                    tracing::error!(group = %name, err = %err, "tick scheduler exited");
                }
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
