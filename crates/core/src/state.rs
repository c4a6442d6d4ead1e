// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared process state: configuration, the store gateway, and the
//! in-process session registry + fan-out router built on top of it.
//!
//! Built once at startup and handed to every subsystem as an
//! `Arc<CoreState>` rather than through module-level singletons (spec.md §9
//! "shared mutable manager singletons" re-architecture note — lifecycle is
//! driven by the process entry point, not by module import order).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{CoreConfig, SyncGroupConfigFile};
use crate::fanout::FanoutRouter;
use crate::registry::SessionRegistry;
use crate::store::Store;

pub struct CoreState {
    pub config: CoreConfig,
    pub sync_groups: SyncGroupConfigFile,
    pub store: Arc<dyn Store>,
    pub registry: Arc<SessionRegistry>,
    pub router: Arc<FanoutRouter>,
    pub shutdown: CancellationToken,
}

impl CoreState {
    pub fn new(
        config: CoreConfig,
        sync_groups: SyncGroupConfigFile,
        store: Arc<dyn Store>,
        shutdown: CancellationToken,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let router = Arc::new(FanoutRouter::new(Arc::clone(&registry)));
        Self { config, sync_groups, store, registry, router, shutdown }
    }
}
