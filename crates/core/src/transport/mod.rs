// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the sync core (spec.md §6).

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::CoreState;

/// Build the axum `Router` with every sync-core route: the ambient health
/// endpoint (SPEC_FULL.md §6) and the session WebSocket upgrade (spec.md
/// §6). Auth for `/ws` happens inside the handler itself, against the
/// bearer token in the query string — there is no separate HTTP-layer auth
/// middleware, since every other route is either unauthenticated (health)
/// or doesn't exist on this surface.
pub fn build_router(state: Arc<CoreState>) -> Router {
    Router::new()
        .route("/healthz", get(http::health))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
