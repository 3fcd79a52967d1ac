// system-tests/tests/helpers/mod.rs
// ============================================================================
// Shared test harness: an in-process router over an in-memory store, plus
// small JSON request helpers so each scenario reads as request/response
// pairs instead of repeated axum boilerplate.
// ============================================================================

#![allow(
    dead_code,
    reason = "this module is compiled once per integration-test binary; not every binary uses every helper"
)]

use std::net::SocketAddr;

use axum::Router;
use axum::body::Body;
use axum::body::to_bytes;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::http::StatusCode;
use serde_json::Value;
use serde_json::json;
use tower::ServiceExt;

use soullink_config::SoullinkConfig;
use soullink_core::identifiers::PlayerId;
use soullink_core::identifiers::RunId;
use soullink_core::registry::RulesConfig;
use soullink_service::AppState;

/// A loopback peer address, for routes gated by `auth::require_localhost`.
pub const LOCALHOST_PEER: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 9001);

/// Test harness wrapping one router over one in-memory database.
pub struct Harness {
    router: Router,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// Builds a fresh harness with an empty, shared in-memory store.
    #[must_use]
    pub fn new() -> Self {
        let location = soullink_store_sqlite::StoreLocation::new_memory();
        let state = AppState::new(location, SoullinkConfig::default()).expect("open in-memory store");
        Self {
            router: soullink_service::routes::build_router(state),
        }
    }

    /// Sends a request built by `f`, inserting a loopback `ConnectInfo` so
    /// localhost-gated admin routes are reachable from this harness.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let mut request = request;
        request
            .extensions_mut()
            .insert(ConnectInfo(LOCALHOST_PEER));
        let response = self.router.clone().oneshot(request).await.expect("dispatch");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri(uri).header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body.to_string())).expect("build request");
        self.send(request).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().method("GET").uri(uri).body(Body::empty()).expect("build request");
        self.send(request).await
    }

    /// Creates a run via the admin surface, returning its id.
    pub async fn create_run(&self, display_name: &str, rules: RulesConfig) -> RunId {
        let (status, body) = self
            .post("/admin/runs", None, json!({ "display_name": display_name, "rules": rules }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create_run: {body}");
        serde_json::from_value(body["id"].clone()).expect("run id")
    }

    /// Creates a player within a run, returning its id and bearer token.
    pub async fn create_player(
        &self,
        run_id: RunId,
        display_name: &str,
        game_label: &str,
        region_label: &str,
    ) -> (PlayerId, String) {
        let (status, body) = self
            .post(
                &format!("/admin/runs/{run_id}/players"),
                None,
                json!({ "display_name": display_name, "game_label": game_label, "region_label": region_label }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create_player: {body}");
        let player_id = serde_json::from_value(body["player_id"].clone()).expect("player id");
        let token = body["token"].as_str().expect("token").to_string();
        (player_id, token)
    }

    /// Submits an event for ingestion, optionally with an idempotency key.
    pub async fn ingest(
        &self,
        run_id: RunId,
        player_id: PlayerId,
        token: &str,
        idempotency_key: Option<&str>,
        payload: Value,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/runs/{run_id}/players/{player_id}/events"))
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json");
        if let Some(key) = idempotency_key {
            builder = builder.header("idempotency-key", key);
        }
        let request = builder.body(Body::from(payload.to_string())).expect("build request");
        self.send(request).await
    }

    /// Pages the catch-up endpoint for `run_id` starting after `since_seq`.
    pub async fn catch_up(&self, run_id: RunId, since_seq: u64) -> (StatusCode, Value) {
        self.get(&format!("/runs/{run_id}/events?since_seq={since_seq}")).await
    }

    /// Invokes the rebuild admin endpoint for `run_id`.
    pub async fn rebuild(&self, run_id: RunId) -> StatusCode {
        let (status, _) = self.post(&format!("/admin/runs/{run_id}/rebuild"), None, Value::Null).await;
        status
    }
}

/// Builds an `encounter` event body.
pub fn encounter(route_id: i64, species_id: i64, family_id: i64) -> Value {
    json!({
        "type": "encounter",
        "route_id": route_id,
        "species_id": species_id,
        "family_id": family_id,
        "level": 5,
        "shiny": false,
        "method": "grass",
        "rod_kind": null,
    })
}

/// Builds a fishing `encounter` event body.
pub fn fishing_encounter(route_id: i64, species_id: i64, family_id: i64, rod_kind: &str) -> Value {
    json!({
        "type": "encounter",
        "route_id": route_id,
        "species_id": species_id,
        "family_id": family_id,
        "level": 5,
        "shiny": false,
        "method": "fish",
        "rod_kind": rod_kind,
    })
}

/// Builds a `catch_result` event body referencing `encounter_id`.
pub fn catch_result(encounter_id: &Value, outcome: &str) -> Value {
    json!({
        "type": "catch_result",
        "encounter_id": encounter_id,
        "outcome": outcome,
    })
}
