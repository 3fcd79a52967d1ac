// crates/soullink-service/src/lib.rs
// ============================================================================
// Module: SoulLink Service
// Description: HTTP/WebSocket ingestion-service crate root.
// Purpose: Wire configuration, store, broker, and router together into a
//          single bound server, and re-export the pieces `soullink-cli`
//          needs to embed the same server in a binary.
// Dependencies: axum, soullink-broker, soullink-config, soullink-store-sqlite,
//               tokio, tower-http, tracing
// ============================================================================

//! ## Overview
//! Resolve a bind address, open a listener, and serve
//! `Router::into_make_service_with_connect_info` so every handler can see
//! the caller's peer address for the localhost-only admin gate.

pub mod auth;
pub mod dto;
pub mod error;
pub mod ingestion;
pub mod routes;
pub mod state;
pub mod ws;

use std::net::SocketAddr;

use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use soullink_config::SoullinkConfig;

pub use state::AppState;

/// Errors raised while starting the service.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The database could not be opened.
    #[error("failed to open database: {0}")]
    Store(#[from] soullink_store_sqlite::StoreError),
    /// The configured bind address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed to bind.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The server loop exited with an error.
    #[error("server loop failed: {0}")]
    Serve(std::io::Error),
}

/// Opens the configured database, builds the router, and serves it until
/// the process is terminated.
///
/// # Errors
///
/// Returns [`ServeError`] if the database cannot be opened, the bind
/// address is already in use, or the accept loop fails.
pub async fn serve(config: SoullinkConfig) -> Result<(), ServeError> {
    let location = soullink_store_sqlite::StoreLocation::File(config.database_path.clone());
    let bind_address = config.bind_address;
    let state = AppState::new(location, config)?;
    let app = routes::build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .map_err(|source| ServeError::Bind {
            addr: bind_address,
            source,
        })?;
    tracing::info!(%bind_address, "soullink-service listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(ServeError::Serve)
}
