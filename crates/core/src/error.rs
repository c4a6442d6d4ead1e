// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds for the sync core, per spec.md §7.

use axum::extract::ws::{CloseFrame, Message};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error kinds for the sync core API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoreError {
    /// Token missing/malformed/unknown. HTTP 401 at upgrade, or close 1008
    /// on heartbeat revalidation failure.
    InvalidToken,
    /// Session row absent, inactive, or expired.
    SessionInvalid,
    /// Inbound message failed schema validation.
    SchemaViolation,
    /// DB transient failure, not recovered by the local retry.
    StoreUnavailable,
    /// Outbound queue overflowed with only critical messages queued.
    Backpressure,
    /// Unclassified.
    Internal,
}

impl CoreError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidToken => 401,
            Self::SessionInvalid => 400,
            Self::SchemaViolation => 400,
            Self::StoreUnavailable => 503,
            Self::Backpressure => 503,
            Self::Internal => 500,
        }
    }

    /// WebSocket close code this error maps to, per spec.md §6/§7.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::InvalidToken => 1008,
            Self::SessionInvalid => 1000,
            Self::SchemaViolation => 1000,
            Self::StoreUnavailable => 1011,
            Self::Backpressure => 1000,
            Self::Internal => 1011,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::SessionInvalid => "session_invalid",
            Self::SchemaViolation => "schema_violation",
            Self::StoreUnavailable => "store_unavailable",
            Self::Backpressure => "backpressure",
            Self::Internal => "internal",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }

    /// The WebSocket `Close` frame this error maps to (spec.md §6 close
    /// codes), for the socket surface — the HTTP surface uses
    /// [`to_http_response`](Self::to_http_response) instead.
    pub fn to_close_frame(&self, reason: impl Into<String>) -> Message {
        Message::Close(Some(CloseFrame { code: self.close_code(), reason: reason.into().into() }))
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let msg = self.as_str().to_owned();
        self.to_http_response(msg).into_response()
    }
}

/// Top-level error response envelope (HTTP surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
