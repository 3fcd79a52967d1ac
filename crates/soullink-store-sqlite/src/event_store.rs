// crates/soullink-store-sqlite/src/event_store.rs
// ============================================================================
// Module: SoulLink Event Store
// Description: Append-only event persistence with per-run sequence
//              numbering and replay.
// Purpose: Append events, query by range/type, and stream a full replay.
// Dependencies: rusqlite, soullink-core
// ============================================================================

//! ## Overview
//! Every operation here takes an open `rusqlite::Transaction` (or
//! `Connection` for read-only queries) rather than owning one itself, so
//! that `append` can be composed into the same transaction as projection
//! application — the atomicity ingestion requires.
//!
//! Sequence numbers form exactly `{1..N}` with no gaps or duplicates,
//! enforced by the `UNIQUE (run_id, seq)` constraint in the schema plus
//! `next_seq` always being computed as `MAX(seq) + 1` inside the same
//! transaction that inserts the row.

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use time::OffsetDateTime;

use soullink_core::events::EventEnvelope;
use soullink_core::events::EventPayload;
use soullink_core::identifiers::EventId;
use soullink_core::identifiers::PlayerId;
use soullink_core::identifiers::RunId;

use crate::error::StoreError;

/// Number of events fetched per batch during [`replay`].
const REPLAY_BATCH_SIZE: u32 = 1_000;

/// Appends `payload` to `run_id`'s event log, assigning the next sequence
/// number, and returns the stored envelope.
///
/// Must run inside a transaction shared with the projection application
/// step so that a partial failure cannot leave an appended event without
/// its projections applied.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on any underlying database failure,
/// including a unique-constraint collision on `(run_id, seq)` — callers
/// racing on sequence assignment for the same run must retry or, as this
/// workspace does, serialize appends per run.
pub fn append(
    tx: &Transaction<'_>,
    run_id: RunId,
    player_id: PlayerId,
    occurred_at: OffsetDateTime,
    payload: EventPayload,
) -> Result<EventEnvelope, StoreError> {
    let next_seq: i64 = tx.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM events WHERE run_id = ?1",
        params![run_id.to_string()],
        |row| row.get(0),
    )?;

    let event_id = EventId::generate();
    let stored_at = OffsetDateTime::now_utc();
    let payload_json = serde_json::to_string(&payload).map_err(|source| StoreError::Corrupt {
        run_id,
        event_id,
        source,
    })?;

    tx.execute(
        "INSERT INTO events (event_id, run_id, player_id, type, occurred_at, stored_at, seq, payload_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event_id.to_string(),
            run_id.to_string(),
            player_id.to_string(),
            payload.type_name(),
            occurred_at.format(&time::format_description::well_known::Rfc3339).unwrap_or_default(),
            stored_at.format(&time::format_description::well_known::Rfc3339).unwrap_or_default(),
            next_seq,
            payload_json,
        ],
    )?;

    Ok(EventEnvelope {
        event_id,
        run_id,
        player_id,
        occurred_at,
        stored_at,
        sequence_number: u64::try_from(next_seq).unwrap_or(0),
        payload,
    })
}

/// Filters applied by [`get_events`].
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Include events with `seq > since_seq` only (exclusive lower bound).
    pub since_seq: Option<u64>,
    /// Include events with `seq <= until_seq` only (inclusive upper bound).
    pub until_seq: Option<u64>,
    /// Restrict to these event type discriminants, if non-empty.
    pub event_types: Vec<&'static str>,
    /// Maximum number of rows to return.
    pub limit: Option<u32>,
}

/// Queries events for `run_id` matching `query`, ordered by sequence number
/// ascending.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure or
/// [`StoreError::Corrupt`] if a stored payload fails to deserialize.
pub fn get_events(
    connection: &Connection,
    run_id: RunId,
    query: &EventQuery,
) -> Result<Vec<EventEnvelope>, StoreError> {
    let mut sql = String::from(
        "SELECT event_id, player_id, type, occurred_at, stored_at, seq, payload_json
         FROM events WHERE run_id = ?1",
    );
    if query.since_seq.is_some() {
        sql.push_str(" AND seq > ?2");
    }
    if query.until_seq.is_some() {
        sql.push_str(" AND seq <= ?3");
    }
    if !query.event_types.is_empty() {
        let placeholders: Vec<String> = query
            .event_types
            .iter()
            .map(|t| format!("'{t}'"))
            .collect();
        sql.push_str(&format!(" AND type IN ({})", placeholders.join(",")));
    }
    sql.push_str(" ORDER BY seq ASC");
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut statement = connection.prepare(&sql)?;
    let since = query.since_seq.map_or(-1, |v| i64::try_from(v).unwrap_or(i64::MAX));
    let until = query.until_seq.map_or(i64::MAX, |v| i64::try_from(v).unwrap_or(i64::MAX));
    let rows = statement.query_map(params![run_id.to_string(), since, until], |row| {
        Ok(RawEventRow {
            event_id: row.get(0)?,
            player_id: row.get(1)?,
            occurred_at: row.get(3)?,
            stored_at: row.get(4)?,
            seq: row.get(5)?,
            payload_json: row.get(6)?,
        })
    })?;

    let mut envelopes = Vec::new();
    for row in rows {
        envelopes.push(row?.into_envelope(run_id)?);
    }
    Ok(envelopes)
}

/// Convenience wrapper returning only events of a single type.
///
/// # Errors
///
/// See [`get_events`].
pub fn get_events_by_type(
    connection: &Connection,
    run_id: RunId,
    event_type: &'static str,
    limit: Option<u32>,
) -> Result<Vec<EventEnvelope>, StoreError> {
    get_events(
        connection,
        run_id,
        &EventQuery {
            event_types: vec![event_type],
            limit,
            ..EventQuery::default()
        },
    )
}

/// Looks up a single event by id within a run.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure or
/// [`StoreError::Corrupt`] if the stored payload fails to deserialize.
pub fn get_event_by_id(
    connection: &Connection,
    run_id: RunId,
    event_id: EventId,
) -> Result<Option<EventEnvelope>, StoreError> {
    let row = connection
        .query_row(
            "SELECT event_id, player_id, type, occurred_at, stored_at, seq, payload_json
             FROM events WHERE run_id = ?1 AND event_id = ?2",
            params![run_id.to_string(), event_id.to_string()],
            |row| {
                Ok(RawEventRow {
                    event_id: row.get(0)?,
                    player_id: row.get(1)?,
                    occurred_at: row.get(3)?,
                    stored_at: row.get(4)?,
                    seq: row.get(5)?,
                    payload_json: row.get(6)?,
                })
            },
        )
        .optional()?;

    row.map(|row| row.into_envelope(run_id)).transpose()
}

/// Returns the latest assigned sequence number for a run, or `0` if the run
/// has no events yet.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure.
pub fn get_latest_sequence(connection: &Connection, run_id: RunId) -> Result<u64, StoreError> {
    let seq: i64 = connection.query_row(
        "SELECT COALESCE(MAX(seq), 0) FROM events WHERE run_id = ?1",
        params![run_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(u64::try_from(seq).unwrap_or(0))
}

/// Streams every event for `run_id` from `from_seq` (inclusive) onward, in
/// batches of [`REPLAY_BATCH_SIZE`], invoking `on_batch` for each batch.
///
/// Used by projection rebuild and by catch-up delivery when it needs more
/// than a single page.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] or [`StoreError::Corrupt`] if any batch
/// fails to load or deserialize.
pub fn replay(
    connection: &Connection,
    run_id: RunId,
    from_seq: u64,
    mut on_batch: impl FnMut(&[EventEnvelope]) -> Result<(), StoreError>,
) -> Result<(), StoreError> {
    let mut cursor = from_seq;
    loop {
        let batch = get_events(
            connection,
            run_id,
            &EventQuery {
                since_seq: cursor.checked_sub(1),
                limit: Some(REPLAY_BATCH_SIZE),
                ..EventQuery::default()
            },
        )?;

        if batch.is_empty() {
            break;
        }

        let batch_len = batch.len();
        let last_seq = batch.last().map(|e| e.sequence_number).unwrap_or(cursor);
        on_batch(&batch)?;
        cursor = last_seq + 1;

        if batch_len < REPLAY_BATCH_SIZE as usize {
            break;
        }
    }
    Ok(())
}

struct RawEventRow {
    event_id: String,
    player_id: String,
    occurred_at: String,
    stored_at: String,
    seq: i64,
    payload_json: String,
}

impl RawEventRow {
    fn into_envelope(self, run_id: RunId) -> Result<EventEnvelope, StoreError> {
        let event_id: EventId =
            self.event_id.parse::<uuid::Uuid>().map(EventId::from).map_err(|_| {
                StoreError::MalformedStoredUuid {
                    table: "events",
                    column: "event_id",
                    value: self.event_id.clone(),
                }
            })?;
        let payload: EventPayload =
            serde_json::from_str(&self.payload_json).map_err(|source| StoreError::Corrupt {
                run_id,
                event_id,
                source,
            })?;
        let player_id: PlayerId =
            self.player_id.parse::<uuid::Uuid>().map(PlayerId::from).map_err(|_| {
                StoreError::MalformedStoredUuid {
                    table: "events",
                    column: "player_id",
                    value: self.player_id.clone(),
                }
            })?;
        let occurred_at = parse_rfc3339("occurred_at", &self.occurred_at)?;
        let stored_at = parse_rfc3339("stored_at", &self.stored_at)?;
        let sequence_number = u64::try_from(self.seq).map_err(|_| StoreError::MalformedStoredSequence {
            table: "events",
            column: "seq",
            value: self.seq,
        })?;
        Ok(EventEnvelope {
            event_id,
            run_id,
            player_id,
            occurred_at,
            stored_at,
            sequence_number,
            payload,
        })
    }
}

fn parse_rfc3339(column: &'static str, value: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339).map_err(|_| {
        StoreError::MalformedStoredTimestamp {
            table: "events",
            column,
            value: value.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use soullink_core::events::FaintPayload;

    fn faint_payload() -> EventPayload {
        EventPayload::Faint(FaintPayload {
            pokemon_key: "party-1".to_string(),
            party_slot_index: Some(0),
        })
    }

    #[test]
    fn append_assigns_gap_free_sequence_numbers() {
        let mut connection = crate::connection::open_in_memory().expect("open");
        let run_id = RunId::generate();
        let player_id = PlayerId::generate();
        connection
            .execute(
                "INSERT INTO runs (id, display_name, rules_json, created_at) VALUES (?1, 'r', '{}', '')",
                params![run_id.to_string()],
            )
            .expect("seed run");
        connection
            .execute(
                "INSERT INTO players (id, run_id, display_name, game_label, region_label, token_hash, created_at)
                 VALUES (?1, ?2, 'p', 'g', 'r', 'h', '')",
                params![player_id.to_string(), run_id.to_string()],
            )
            .expect("seed player");

        let tx = connection.transaction().expect("tx");
        let first = append(&tx, run_id, player_id, OffsetDateTime::now_utc(), faint_payload())
            .expect("append 1");
        let second = append(&tx, run_id, player_id, OffsetDateTime::now_utc(), faint_payload())
            .expect("append 2");
        tx.commit().expect("commit");

        assert_eq!(first.sequence_number, 1);
        assert_eq!(second.sequence_number, 2);
        assert_eq!(get_latest_sequence(&connection, run_id).expect("latest"), 2);
    }

    #[test]
    fn get_events_since_seq_is_exclusive() {
        let mut connection = crate::connection::open_in_memory().expect("open");
        let run_id = RunId::generate();
        let player_id = PlayerId::generate();
        connection
            .execute(
                "INSERT INTO runs (id, display_name, rules_json, created_at) VALUES (?1, 'r', '{}', '')",
                params![run_id.to_string()],
            )
            .expect("seed run");
        connection
            .execute(
                "INSERT INTO players (id, run_id, display_name, game_label, region_label, token_hash, created_at)
                 VALUES (?1, ?2, 'p', 'g', 'r', 'h', '')",
                params![player_id.to_string(), run_id.to_string()],
            )
            .expect("seed player");

        let tx = connection.transaction().expect("tx");
        for _ in 0..3 {
            append(&tx, run_id, player_id, OffsetDateTime::now_utc(), faint_payload()).expect("append");
        }
        tx.commit().expect("commit");

        let events = get_events(
            &connection,
            run_id,
            &EventQuery {
                since_seq: Some(1),
                ..EventQuery::default()
            },
        )
        .expect("query");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence_number, 2);
        assert_eq!(events[1].sequence_number, 3);
    }
}
