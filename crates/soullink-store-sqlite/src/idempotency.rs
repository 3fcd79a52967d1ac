// crates/soullink-store-sqlite/src/idempotency.rs
// ============================================================================
// Module: SoulLink Idempotency Layer
// Description: Request-hash-keyed replay of prior ingestion responses.
//// Purpose: Let a retried ingestion request with the same idempotency key
//          and body observe the original response instead of re-applying
//          the event a second time.
// Dependencies: rusqlite, soullink-core, uuid
// ============================================================================

//! ## Overview
//! A caller supplies an idempotency key (a UUID) with every ingestion
//! request. [`check`] looks the key up scoped to `(run_id, player_id)`; if
//! found, the stored `request_hash` must match the hash of the current
//! request body exactly, or the request is rejected as a key reuse with a
//! different payload rather than silently replayed. [`store`] records the
//! response after a fresh request has been fully applied.

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use soullink_core::hashing;
use soullink_core::identifiers::PlayerId;
use soullink_core::identifiers::RunId;

use crate::error::StoreError;

/// Outcome of an idempotency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyCheck {
    /// No prior request with this key exists; proceed with fresh
    /// processing.
    Fresh,
    /// A prior request with this key and an identical body already
    /// completed; replay the stored response verbatim.
    Replay(String),
    /// A prior request with this key exists but its body hash differs —
    /// the caller is reusing a key for a different request.
    KeyReusedWithDifferentBody,
}

/// Validates that `key` is a well-formed UUID (v4 or v5).
///
/// # Errors
///
/// Returns [`StoreError::MalformedIdempotencyKey`] if `key` does not parse
/// as a UUID or is not version 4 or 5.
pub fn validate_key(key: &str) -> Result<Uuid, StoreError> {
    let parsed = Uuid::parse_str(key)
        .map_err(|_| StoreError::MalformedIdempotencyKey(key.to_string()))?;
    match parsed.get_version_num() {
        4 | 5 => Ok(parsed),
        _ => Err(StoreError::MalformedIdempotencyKey(key.to_string())),
    }
}

/// Checks whether `key` has already been used for `(run_id, player_id)`,
/// comparing against the canonical-JSON hash of `request_body`.
///
/// # Errors
///
/// Returns [`StoreError`] on a database failure or a malformed stored hash.
pub fn check<T: serde::Serialize + ?Sized>(
    connection: &Connection,
    run_id: RunId,
    player_id: PlayerId,
    key: &Uuid,
    request_body: &T,
) -> Result<IdempotencyCheck, StoreError> {
    let request_hash = hashing::hash_canonical_json(request_body)
        .map_err(|err| StoreError::MalformedIdempotencyKey(err.to_string()))?;

    let existing: Option<(String, String)> = connection
        .query_row(
            "SELECT request_hash, response_json FROM idempotency_keys
             WHERE key = ?1 AND run_id = ?2 AND player_id = ?3",
            params![key.to_string(), run_id.to_string(), player_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(match existing {
        None => IdempotencyCheck::Fresh,
        Some((stored_hash, response_json)) if stored_hash == request_hash => {
            IdempotencyCheck::Replay(response_json)
        }
        Some(_) => IdempotencyCheck::KeyReusedWithDifferentBody,
    })
}

/// Records the response for a freshly processed request, so a retry with
/// the same key and body can be replayed by [`check`].
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure.
pub fn store<T: serde::Serialize + ?Sized>(
    connection: &rusqlite::Transaction<'_>,
    run_id: RunId,
    player_id: PlayerId,
    key: &Uuid,
    request_body: &T,
    response_json: &str,
) -> Result<(), StoreError> {
    let request_hash = hashing::hash_canonical_json(request_body)
        .map_err(|err| StoreError::MalformedIdempotencyKey(err.to_string()))?;
    let created_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    connection.execute(
        "INSERT INTO idempotency_keys (key, run_id, player_id, request_hash, response_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            key.to_string(),
            run_id.to_string(),
            player_id.to_string(),
            request_hash,
            response_json,
            created_at,
        ],
    )?;
    Ok(())
}
