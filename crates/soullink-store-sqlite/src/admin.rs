// crates/soullink-store-sqlite/src/admin.rs
// ============================================================================
// Module: SoulLink Admin Operations
// Description: Projection rebuild and event-store statistics.
// Purpose: Recover from a corrupted or stale read model by replaying the
//          full event stream, and expose basic operational visibility.
// Dependencies: rusqlite, soullink-core, tracing
// ============================================================================

//! ## Overview
//! `rebuild_all` clears the derived read-model tables for a run —
//! `route_progress`, `blocklist`, `party_status`, `encounter_index`, and
//! `route_catches` — and replays every event through the projection engine
//! inside one transaction. `links` and `link_members` are never cleared
//! here: they represent core domain state (an explicit soul link the rules
//! engine created), not a pure read model derivable solely from re-running
//! projections, a pure read model is always fully re-derivable, but a link is not.

use rusqlite::Connection;
use rusqlite::params;

use soullink_core::identifiers::RunId;

use crate::error::StoreError;
use crate::event_store;
use crate::projections;

/// Summary statistics about a run's event store, for operational
/// visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventStoreStats {
    /// Total number of events recorded for the run.
    pub event_count: u64,
    /// Latest assigned sequence number (equal to `event_count` absent
    /// gaps, which the event store's sequence assignment guarantees).
    pub latest_sequence: u64,
}

/// Clears derived projections for `run_id` and replays its full event
/// stream through the projection engine, within a single transaction.
///
/// # Errors
///
/// Returns [`StoreError`] if the run does not exist, a stored event fails
/// to deserialize, or any database operation fails.
pub fn rebuild_all(connection: &mut Connection, run_id: RunId) -> Result<(), StoreError> {
    tracing::info!(%run_id, "rebuilding projections");
    let tx = connection.transaction()?;

    tx.execute(
        "DELETE FROM route_progress WHERE run_id = ?1",
        params![run_id.to_string()],
    )?;
    tx.execute(
        "DELETE FROM blocklist WHERE run_id = ?1",
        params![run_id.to_string()],
    )?;
    tx.execute(
        "DELETE FROM party_status WHERE run_id = ?1",
        params![run_id.to_string()],
    )?;
    tx.execute(
        "DELETE FROM encounter_index WHERE run_id = ?1",
        params![run_id.to_string()],
    )?;
    tx.execute(
        "DELETE FROM route_catches WHERE run_id = ?1",
        params![run_id.to_string()],
    )?;

    let mut replayed = 0u64;
    event_store::replay(&tx, run_id, 1, |batch| {
        for envelope in batch {
            projections::apply_event(&tx, envelope)?;
            replayed += 1;
        }
        Ok(())
    })?;

    tx.commit()?;
    tracing::info!(%run_id, replayed, "rebuild complete");
    Ok(())
}

/// Returns basic event-store statistics for a run.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure.
pub fn event_store_stats(
    connection: &Connection,
    run_id: RunId,
) -> Result<EventStoreStats, StoreError> {
    let latest_sequence = event_store::get_latest_sequence(connection, run_id)?;
    let event_count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM events WHERE run_id = ?1",
        params![run_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(EventStoreStats {
        event_count: u64::try_from(event_count).unwrap_or(0),
        latest_sequence,
    })
}
