// crates/soullink-service/src/ws.rs
// ============================================================================
// Module: SoulLink Live Stream
// Description: WebSocket catch-up-then-subscribe endpoint.
// Purpose: Give a reconnecting client exactly one bytestream that starts
//          with everything it missed and continues with everything new,
//          with no gap and no duplicate at the splice point.
// Dependencies: axum, soullink-broker, soullink-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! A subscriber first pages through the event store from its declared
//! `since_seq`, then subscribes to the broker's live feed. The splice point
//! is made gap-free by subscribing to the broker *before* running the
//! catch-up query, and filtering anything the live feed delivers that
//! catch-up already sent, keyed on sequence number — this avoids missing an
//! event appended between the two steps.

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Deserialize;

use soullink_broker::RecvError;
use soullink_core::events::EventEnvelope;
use soullink_core::identifiers::PlayerId;
use soullink_core::identifiers::RunId;
use soullink_store_sqlite::event_store;
use soullink_store_sqlite::event_store::EventQuery;
use soullink_store_sqlite::registry;

use crate::auth;
use crate::state::AppState;

/// Query parameters accepted by the live-stream endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveStreamQuery {
    /// Resume point: catch-up starts just after this sequence number.
    /// Defaults to 0 (send the whole run history before switching live).
    #[serde(default)]
    since_seq: u64,
    /// Bearer token, accepted as a query parameter because browser
    /// `WebSocket` clients cannot set an `Authorization` header.
    token: Option<String>,
}

/// Upgrades an authenticated connection to a live event stream for one run.
pub async fn live_stream(
    State(state): State<AppState>,
    Path((run_id, player_id)): Path<(RunId, PlayerId)>,
    Query(query): Query<LiveStreamQuery>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let token = query
        .token
        .clone()
        .or_else(|| auth::extract_bearer_token(&headers).ok());

    let Some(token) = token else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let authorized = match state.db.for_run(run_id).await {
        Ok(conn) => registry::verify_player_token(&conn, run_id, player_id, &token).unwrap_or(false),
        Err(_) => false,
    };
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    upgrade.on_upgrade(move |socket| stream_run(socket, state, run_id, query.since_seq))
}

async fn stream_run(mut socket: WebSocket, state: AppState, run_id: RunId, since_seq: u64) {
    let mut subscription = state.broker.subscribe(run_id);

    let catch_up = match state.db.for_run(run_id).await {
        Ok(conn) => event_store::get_events(
            &conn,
            run_id,
            &EventQuery {
                since_seq: Some(since_seq),
                ..EventQuery::default()
            },
        ),
        Err(err) => Err(err),
    };
    let catch_up = match catch_up {
        Ok(events) => events,
        Err(err) => {
            tracing::error!(%err, %run_id, "catch-up query failed, closing stream");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let mut last_sent = since_seq;
    for envelope in catch_up {
        last_sent = envelope.sequence_number;
        if send_envelope(&mut socket, &envelope).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            received = subscription.recv() => {
                match received {
                    Ok(envelope) => {
                        if envelope.sequence_number <= last_sent {
                            continue;
                        }
                        last_sent = envelope.sequence_number;
                        if send_envelope(&mut socket, &envelope).await.is_err() {
                            return;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // A subscriber that cannot keep up is disconnected rather
                        // than kept on a gapped stream; the client is expected to
                        // reconnect and catch up from its last-seen sequence number.
                        tracing::warn!(%run_id, skipped, "live subscriber lagged, disconnecting");
                        let _ = socket.send(Message::Close(None)).await;
                        return;
                    }
                    Err(RecvError::Closed) => return,
                }
            }
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => return,
                }
            }
        }
    }
}

async fn send_envelope(socket: &mut WebSocket, envelope: &EventEnvelope) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(envelope).unwrap_or_else(|_| "{}".to_string());
    socket.send(Message::Text(payload.into())).await
}
