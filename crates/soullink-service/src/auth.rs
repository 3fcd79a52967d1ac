// crates/soullink-service/src/auth.rs
// ============================================================================
// Module: SoulLink Service Authentication
// Description: Bearer-token extraction and localhost-only gating.
// Purpose: Centralize the two access-control checks every handler needs:
//          per-request bearer-token verification and the localhost-only
//          admin gate.
// Dependencies: axum
// ============================================================================

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;

use crate::error::ServiceError;

/// Header carrying the player's bearer token for HTTP requests.
const AUTHORIZATION_HEADER: &str = "authorization";
/// Expected scheme prefix on the authorization header value.
const BEARER_PREFIX: &str = "Bearer ";

/// Extracts the bearer token from an `Authorization: Bearer <token>` header.
///
/// # Errors
///
/// Returns [`ServiceError::Unauthorized`] if the header is missing,
/// non-UTF-8, or does not carry the `Bearer ` prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, ServiceError> {
    let raw = headers
        .get(AUTHORIZATION_HEADER)
        .ok_or(ServiceError::Unauthorized)?
        .to_str()
        .map_err(|_| ServiceError::Unauthorized)?;
    raw.strip_prefix(BEARER_PREFIX)
        .map(str::to_string)
        .ok_or(ServiceError::Unauthorized)
}

/// Rejects a request whose peer address is not a loopback address, for the
/// localhost-only admin surface.
///
/// # Errors
///
/// Returns [`ServiceError::NotLocalhost`] if `connect_info`'s address is
/// not loopback.
pub fn require_localhost(connect_info: &ConnectInfo<SocketAddr>) -> Result<(), ServiceError> {
    if connect_info.0.ip().is_loopback() {
        Ok(())
    } else {
        Err(ServiceError::NotLocalhost)
    }
}
