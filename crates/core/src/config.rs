// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide configuration: CLI/env globals plus a per-sync-group file,
//! per spec.md §6 "Configuration".

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::model::SyncGroupName;

/// Global configuration for the sync core server.
#[derive(Debug, Clone, clap::Parser)]
pub struct CoreConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "SYNC_CORE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9900, env = "SYNC_CORE_PORT")]
    pub port: u16,

    /// Postgres connection string for the store gateway.
    #[arg(long, env = "SYNC_CORE_DATABASE_URL")]
    pub database_url: String,

    /// Path to the per-sync-group config JSON file (see `SyncGroupConfigFile`).
    #[arg(long, env = "SYNC_GROUP_CONFIG")]
    pub sync_group_config: PathBuf,

    /// Heartbeat inactivity window before a session is considered stalled.
    #[arg(long, default_value_t = 30_000, env = "SYNC_CORE_HEARTBEAT_INACTIVITY_MS")]
    pub heartbeat_inactivity_ms: u64,

    /// Reaper sweep interval.
    #[arg(long, default_value_t = 1_000, env = "SYNC_CORE_REAPER_INTERVAL_MS")]
    pub reaper_interval_ms: u64,

    /// Default query execution timeout.
    #[arg(long, default_value_t = 5_000, env = "SYNC_CORE_QUERY_TIMEOUT_MS")]
    pub query_timeout_ms: u64,

    /// Default socket write timeout.
    #[arg(long, default_value_t = 10_000, env = "SYNC_CORE_SOCKET_WRITE_TIMEOUT_MS")]
    pub socket_write_timeout_ms: u64,

    /// Bounded capacity of each session's outbound queue.
    #[arg(long, default_value_t = 256, env = "SYNC_CORE_OUTBOUND_QUEUE_CAPACITY")]
    pub outbound_queue_capacity: usize,

    /// Session duration granted at login, used to compute `expires_at` for
    /// sessions created outside this core (contract boundary, spec.md §1).
    #[arg(long, default_value_t = 86_400_000, env = "SYNC_CORE_SESSION_DURATION_MS")]
    pub session_duration_ms: u64,

    /// Max rows returned by a single `query_request` before clamping with a
    /// protocol-level error, per spec.md §4.7.
    #[arg(long, default_value_t = 10_000, env = "SYNC_CORE_QUERY_MAX_ROWS")]
    pub query_max_rows: usize,
}

impl CoreConfig {
    pub fn heartbeat_inactivity(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_inactivity_ms)
    }

    pub fn reaper_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reaper_interval_ms)
    }

    pub fn query_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.query_timeout_ms)
    }

    pub fn socket_write_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.socket_write_timeout_ms)
    }
}

/// Per-sync-group tick cadence and retention, loaded from a JSON file at
/// startup (the `--sync-group-config` path), mirroring the teacher's
/// `--credential-config` JSON-file-plus-CLI-flag pattern.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncGroupSettings {
    pub tick_rate_ms: u64,
    pub max_buffered_ticks: u32,
}

impl SyncGroupSettings {
    pub fn tick_rate(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_rate_ms)
    }
}

/// The full contents of the per-sync-group config file: a map of sync group
/// name to its settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SyncGroupConfigFile {
    #[serde(flatten)]
    pub groups: HashMap<SyncGroupName, SyncGroupSettings>,
}

impl SyncGroupConfigFile {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn get(&self, group: &str) -> Option<&SyncGroupSettings> {
        self.groups.get(group)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
