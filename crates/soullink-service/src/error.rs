// crates/soullink-service/src/error.rs
// ============================================================================
// Module: SoulLink Service Errors
// Description: Top-level ingestion-service error taxonomy and its RFC-9457
//              problem+json wire mapping.
// Purpose: Give every handler one error type that already knows how to
//          render itself at the HTTP edge, instead of re-deriving detail
//          from a generic status code.
// Dependencies: axum, serde_json, soullink-store-sqlite, thiserror
// ============================================================================

//! ## Overview
//! `Validation`, `Unauthorized`, and `NotFound` reject with no side effects;
//! `Store` wraps a [`soullink_store_sqlite::StoreError`] for which
//! [`soullink_store_sqlite::StoreError::is_fatal`] returned `true` and is
//! surfaced as a server error for operator attention. Expected projection
//! conflicts are never represented here — they are resolved inside the store
//! and never reach this layer as an error.

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;
use thiserror::Error;

use soullink_store_sqlite::StoreError;

/// Errors raised while handling an ingestion-service request.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request body failed validation (malformed payload, unknown enum
    /// value, a fishing encounter missing its rod kind).
    #[error("invalid request: {0}")]
    Validation(String),
    /// The bearer token did not match the declared player, or no token was
    /// presented.
    #[error("unauthorized")]
    Unauthorized,
    /// The declared player does not belong to the declared run.
    #[error("player does not belong to this run")]
    PlayerRunMismatch,
    /// A referenced run, player, or encounter does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The idempotency key was reused with a different request body.
    #[error("idempotency key reused with a different request body")]
    IdempotencyKeyConflict,
    /// The caller is not connecting from a loopback address, and the
    /// requested operation is localhost-only.
    #[error("this operation is only available to localhost callers")]
    NotLocalhost,
    /// A store-layer failure classified as fatal: surfaced to the operator,
    /// never silently absorbed.
    #[error("internal error: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RunNotFound(run_id) => Self::NotFound(format!("run {run_id}")),
            StoreError::PlayerNotFound { run_id, player_id } => {
                Self::NotFound(format!("player {player_id} in run {run_id}"))
            }
            StoreError::EventNotFound { run_id, event_id } => {
                Self::NotFound(format!("event {event_id} in run {run_id}"))
            }
            StoreError::MalformedIdempotencyKey(key) => {
                Self::Validation(format!("malformed idempotency key: {key}"))
            }
            other => Self::Store(other),
        }
    }
}

/// RFC 9457 "problem details" body.
#[derive(Debug, Serialize)]
struct Problem {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    status: u16,
    detail: String,
}

impl ServiceError {
    fn parts(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "about:blank#validation", "Validation failed"),
            Self::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "about:blank#unauthorized", "Unauthorized")
            }
            Self::PlayerRunMismatch => (
                StatusCode::FORBIDDEN,
                "about:blank#player-run-mismatch",
                "Player does not belong to this run",
            ),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "about:blank#not-found", "Not found"),
            Self::IdempotencyKeyConflict => (
                StatusCode::CONFLICT,
                "about:blank#idempotency-conflict",
                "Idempotency key reused with a different body",
            ),
            Self::NotLocalhost => {
                (StatusCode::FORBIDDEN, "about:blank#localhost-only", "Localhost only")
            }
            Self::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "about:blank#internal", "Internal error")
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, problem_type, title) = self.parts();
        if matches!(self, Self::Store(_)) {
            tracing::error!(error = %self, "fatal store error surfaced to caller");
        }
        let body = Problem {
            problem_type,
            title,
            status: status.as_u16(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
