// crates/soullink-service/src/routes.rs
// ============================================================================
// Module: SoulLink Service Routes
// Description: HTTP surface: ingestion, catch-up, and the localhost-only
//              admin endpoints.
// Purpose: Wire every externally-facing operation to its handler, keeping
//          request parsing and access-control extraction here and the
//          actual work in `ingestion`/`soullink-store-sqlite`.
// Dependencies: axum, soullink-store-sqlite, tower-http
// ============================================================================

//! ## Overview
//! One `Router::new().route(...)` tree, each handler taking
//! `State`/`Path`/`Query`/`Json` extractors and returning
//! `impl IntoResponse`. Path parameters use axum's `{name}` syntax
//! throughout.

use std::net::SocketAddr;

use axum::Json;
use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::post;

use soullink_core::identifiers::PlayerId;
use soullink_core::identifiers::RunId;
use soullink_store_sqlite::admin;
use soullink_store_sqlite::event_store;
use soullink_store_sqlite::event_store::EventQuery;
use soullink_store_sqlite::registry;

use crate::auth;
use crate::dto::CatchUpQuery;
use crate::dto::CatchUpResponse;
use crate::dto::CreatePlayerRequest;
use crate::dto::CreatePlayerResponse;
use crate::dto::CreateRunRequest;
use crate::dto::DEFAULT_CATCHUP_LIMIT;
use crate::dto::IngestRequest;
use crate::dto::MAX_CATCHUP_LIMIT;
use crate::dto::RotateTokenResponse;
use crate::error::ServiceError;
use crate::ingestion;
use crate::state::AppState;
use crate::ws;

/// Maximum accepted body size for a single ingestion request.
const INGEST_BODY_LIMIT_BYTES: usize = 16 * 1024;

/// Header carrying the client-supplied idempotency key, if any.
const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Builds the complete application router.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let player_routes = Router::new()
        .route(
            "/runs/{run_id}/players/{player_id}/events",
            post(ingest_event).layer(DefaultBodyLimit::max(INGEST_BODY_LIMIT_BYTES)),
        )
        .route("/runs/{run_id}/players/{player_id}/stream", get(ws::live_stream))
        .route("/runs/{run_id}/events", get(catch_up));

    let admin_routes = Router::new()
        .route("/admin/runs", post(create_run))
        .route("/admin/runs/{run_id}/players", post(create_player))
        .route(
            "/admin/runs/{run_id}/players/{player_id}/rotate-token",
            post(rotate_token),
        )
        .route("/admin/runs/{run_id}/rebuild", post(rebuild))
        .route("/admin/runs/{run_id}/stats", get(stats));

    Router::new().merge(player_routes).merge(admin_routes).with_state(state)
}

async fn ingest_event(
    State(state): State<AppState>,
    Path((run_id, player_id)): Path<(RunId, PlayerId)>,
    headers: HeaderMap,
    Json(request): Json<IngestRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let token = auth::extract_bearer_token(&headers)?;
    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let response = ingestion::ingest_event(
        &state,
        run_id,
        player_id,
        &token,
        idempotency_key.as_deref(),
        request,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn catch_up(
    State(state): State<AppState>,
    Path(run_id): Path<RunId>,
    Query(query): Query<CatchUpQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let conn = state.db.for_run(run_id).await?;
    registry::get_run(&conn, run_id)?.ok_or_else(|| ServiceError::NotFound(format!("run {run_id}")))?;

    let limit = query.limit.unwrap_or(DEFAULT_CATCHUP_LIMIT).min(MAX_CATCHUP_LIMIT);
    let events = event_store::get_events(
        &conn,
        run_id,
        &EventQuery {
            since_seq: Some(query.since_seq),
            limit: Some(limit + 1),
            ..EventQuery::default()
        },
    )?;
    let has_more = events.len() > limit as usize;
    let mut events = events;
    events.truncate(limit as usize);
    let latest_seq = event_store::get_latest_sequence(&conn, run_id)?;

    Ok(Json(CatchUpResponse {
        events,
        latest_seq,
        has_more,
    }))
}

async fn create_run(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(request): Json<CreateRunRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    auth::require_localhost(&ConnectInfo(peer))?;
    let conn = state.db.untracked()?;
    let run = registry::create_run(&conn, &request.display_name, request.rules)?;
    Ok((StatusCode::CREATED, Json(run)))
}

async fn create_player(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(run_id): Path<RunId>,
    Json(request): Json<CreatePlayerRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    auth::require_localhost(&ConnectInfo(peer))?;
    let conn = state.db.for_run(run_id).await?;
    let (player, token) = registry::create_player(
        &conn,
        run_id,
        &request.display_name,
        &request.game_label,
        &request.region_label,
    )?;
    Ok((
        StatusCode::CREATED,
        Json(CreatePlayerResponse {
            player_id: player.id,
            token,
        }),
    ))
}

async fn rotate_token(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path((run_id, player_id)): Path<(RunId, PlayerId)>,
) -> Result<impl IntoResponse, ServiceError> {
    auth::require_localhost(&ConnectInfo(peer))?;
    let conn = state.db.for_run(run_id).await?;
    let token = registry::rotate_player_token(&conn, run_id, player_id)?;
    Ok(Json(RotateTokenResponse { token }))
}

async fn rebuild(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(run_id): Path<RunId>,
) -> Result<impl IntoResponse, ServiceError> {
    auth::require_localhost(&ConnectInfo(peer))?;
    let mut conn = state.db.for_run(run_id).await?;
    admin::rebuild_all(&mut conn, run_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stats(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(run_id): Path<RunId>,
) -> Result<impl IntoResponse, ServiceError> {
    auth::require_localhost(&ConnectInfo(peer))?;
    let conn = state.db.for_run(run_id).await?;
    let stats = admin::event_store_stats(&conn, run_id)?;
    Ok(Json(SerializableStats {
        event_count: stats.event_count,
        latest_sequence: stats.latest_sequence,
    }))
}

/// `EventStoreStats` carries no `Serialize` impl in the store crate since it
/// is also used internally; the HTTP surface re-shapes it here instead of
/// adding a wire dependency to the store crate for one response type.
#[derive(serde::Serialize)]
struct SerializableStats {
    event_count: u64,
    latest_sequence: u64,
}
