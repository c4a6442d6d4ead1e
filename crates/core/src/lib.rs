// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worldsync core: the session + tick + fan-out runtime behind a multi-user
//! virtual-world server (session admission, the per-sync-group tick loop,
//! change fan-out, the ACL-scoped query executor, and keyframe delivery).

pub mod auth;
pub mod config;
pub mod delivery;
pub mod error;
pub mod fanout;
pub mod heartbeat;
pub mod keyframe;
pub mod model;
pub mod protocol;
pub mod query;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::{CoreConfig, SyncGroupConfigFile};
use crate::state::CoreState;
use crate::store::pg::PgStore;
use crate::store::Store;
use crate::transport::build_router;

/// Run the sync core server until shutdown.
pub async fn run(config: CoreConfig) -> anyhow::Result<()> {
    let sync_groups = SyncGroupConfigFile::load(&config.sync_group_config)?;
    let store: Arc<dyn Store> = Arc::new(PgStore::connect(&config.database_url).await?);
    let shutdown = CancellationToken::new();
    let addr = format!("{}:{}", config.host, config.port);

    let state = Arc::new(CoreState::new(config, sync_groups, store, shutdown.clone()));

    let mut tasks =
        scheduler::spawn_all(&state.sync_groups.groups, state.store.clone(), state.router.clone(), shutdown.clone());

    tasks.push(tokio::spawn(heartbeat::run(
        state.registry.clone(),
        state.store.clone(),
        state.config.heartbeat_inactivity(),
        state.config.reaper_interval(),
        shutdown.clone(),
    )));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received ctrl-c, shutting down");
                shutdown.cancel();
            }
        });
    }

    // Graceful shutdown only stops new connections; each open socket is its
    // own future the server awaits until `handle.cancel` fires, so shutdown
    // has to reach into the registry and cancel every live session itself.
    {
        let shutdown = shutdown.clone();
        let registry = state.registry.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            for handle in registry.snapshot().await {
                handle.cancel.cancel();
            }
        });
    }

    tracing::info!(%addr, "worldsync-serverd listening");
    let router = build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    for task in tasks {
        task.abort();
    }

    Ok(())
}
