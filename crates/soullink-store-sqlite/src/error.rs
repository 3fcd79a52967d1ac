// crates/soullink-store-sqlite/src/error.rs
// ============================================================================
// Module: SoulLink Store Errors
// Description: Error taxonomy for the SQLite-backed store.
// Purpose: Separate expected/retryable conditions from programmer-facing
//          bugs.
// Dependencies: rusqlite, thiserror
// ============================================================================

use thiserror::Error;

use soullink_core::identifiers::EventId;
use soullink_core::identifiers::PlayerId;
use soullink_core::identifiers::RunId;
use soullink_core::rules::RulesError;

/// Errors raised by the event store, projection engine, idempotency layer,
/// and admin operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying `SQLite` driver returned an error that was not
    /// classified as an expected constraint conflict.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored event payload could not be deserialized. This is a fatal
    /// condition: it indicates corruption or a schema mismatch, not a
    /// caller error.
    #[error("failed to deserialize event {event_id} in run {run_id}: {source}")]
    Corrupt {
        /// Run the event belongs to.
        run_id: RunId,
        /// Event that failed to deserialize.
        event_id: EventId,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The referenced run does not exist.
    #[error("run {0} not found")]
    RunNotFound(RunId),

    /// The referenced player does not exist within its run.
    #[error("player {player_id} not found in run {run_id}")]
    PlayerNotFound {
        /// Run searched.
        run_id: RunId,
        /// Player that could not be found.
        player_id: PlayerId,
    },

    /// The referenced event does not exist within its run.
    #[error("event {event_id} not found in run {run_id}")]
    EventNotFound {
        /// Run searched.
        run_id: RunId,
        /// Event that could not be found.
        event_id: EventId,
    },

    /// The rules engine rejected the event outright (a programmer error,
    /// never expected to reach the wire).
    #[error("rules engine rejected event: {0}")]
    Rules(#[from] RulesError),

    /// An idempotency key was malformed (not a valid UUID).
    #[error("idempotency key is not a well-formed UUID: {0}")]
    MalformedIdempotencyKey(String),

    /// A UUID-typed column held a value that does not parse as a UUID.
    /// Fatal: these columns are only ever written by this crate, so a
    /// malformed value indicates storage corruption.
    #[error("column {column} in table {table} holds a malformed UUID: {value}")]
    MalformedStoredUuid {
        /// Table the malformed value was read from.
        table: &'static str,
        /// Column the malformed value was read from.
        column: &'static str,
        /// The malformed value itself.
        value: String,
    },

    /// An RFC 3339 timestamp column held a value that does not parse.
    /// Fatal, for the same reason as [`StoreError::MalformedStoredUuid`].
    #[error("column {column} in table {table} holds a malformed timestamp: {value}")]
    MalformedStoredTimestamp {
        /// Table the malformed value was read from.
        table: &'static str,
        /// Column the malformed value was read from.
        column: &'static str,
        /// The malformed value itself.
        value: String,
    },

    /// A sequence-number column held a value outside `u64`'s range. Fatal:
    /// silently coercing it would risk violating the gap-free sequencing
    /// invariant on replay.
    #[error("column {column} in table {table} holds a sequence number out of range: {value}")]
    MalformedStoredSequence {
        /// Table the malformed value was read from.
        table: &'static str,
        /// Column the malformed value was read from.
        column: &'static str,
        /// The malformed value itself.
        value: i64,
    },
}

impl StoreError {
    /// Returns `true` if this error represents a condition the caller
    /// should treat as a fatal/operator-facing failure rather than a
    /// request-scoped rejection.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Corrupt { .. }
                | Self::Rules(_)
                | Self::MalformedStoredUuid { .. }
                | Self::MalformedStoredTimestamp { .. }
                | Self::MalformedStoredSequence { .. }
        )
    }
}
