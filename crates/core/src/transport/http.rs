// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ambient health endpoint (SPEC_FULL.md §6 addition) — no auth, matching
//! the teacher's exempt `/api/v1/health`, for operational parity. Not
//! itself a world-sync feature, so it isn't subject to the Non-goals.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::CoreState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub session_count: usize,
}

pub async fn health(State(state): State<Arc<CoreState>>) -> Json<HealthResponse> {
    let session_count = state.registry.len().await;
    Json(HealthResponse { status: "running", session_count })
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
