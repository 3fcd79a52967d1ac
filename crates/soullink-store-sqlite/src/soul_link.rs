// crates/soullink-store-sqlite/src/soul_link.rs
// ============================================================================
// Module: SoulLink Creation Trigger Queries
// Description: Read helpers backing the ingestion service's soul-link
//              creation trigger.
// Purpose: Let the service layer decide, after a caught catch result is
//          projected, whether a soul link should be created or a member
//          added to an existing one, without hand-rolling SQL at the call
//          site.
// Dependencies: rusqlite, soullink-core
// ============================================================================

//! ## Overview
//! None of these queries mutate state; the mutation itself (inserting into
//! `links`/`link_members`) happens through the ordinary event-sourced path
//! via [`crate::projections::apply_event`] on a synthesized
//! `SoulLinkCreated` event, keeping the soul link's creation itself
//! replayable and auditable like every other domain change.

use rusqlite::Connection;
use rusqlite::Transaction;
use rusqlite::params;

use soullink_core::identifiers::LinkId;
use soullink_core::identifiers::PlayerId;
use soullink_core::identifiers::RouteId;
use soullink_core::identifiers::RunId;

use crate::error::StoreError;

/// Returns the distinct players who have caught an encounter on `route_id`
/// within `run_id`, regardless of which of them (if any) won the route's
/// first-encounter finalization race.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure.
pub fn distinct_caught_players(
    tx: &Transaction<'_>,
    run_id: RunId,
    route_id: RouteId,
) -> Result<Vec<PlayerId>, StoreError> {
    let mut statement = tx.prepare(
        "SELECT player_id FROM route_catches WHERE run_id = ?1 AND route_id = ?2 ORDER BY created_at ASC",
    )?;
    let rows = statement.query_map(params![run_id.to_string(), route_id.get()], |row| {
        row.get::<_, String>(0)
    })?;

    let mut players = Vec::new();
    for row in rows {
        let raw = row?;
        let uuid = raw.parse::<uuid::Uuid>().map_err(|_| StoreError::MalformedStoredUuid {
            table: "route_catches",
            column: "player_id",
            value: raw.clone(),
        })?;
        players.push(PlayerId::from(uuid));
    }
    Ok(players)
}

/// Looks up an existing soul link for `(run_id, route_id)`, if one exists.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure.
pub fn find_link(
    tx: &Transaction<'_>,
    run_id: RunId,
    route_id: RouteId,
) -> Result<Option<LinkId>, StoreError> {
    let result = tx.query_row(
        "SELECT id FROM links WHERE run_id = ?1 AND route_id = ?2",
        params![run_id.to_string(), route_id.get()],
        |row| row.get::<_, String>(0),
    );
    match result {
        Ok(raw) => {
            let uuid = raw.parse::<uuid::Uuid>().map_err(|_| StoreError::MalformedStoredUuid {
                table: "links",
                column: "id",
                value: raw.clone(),
            })?;
            Ok(Some(LinkId::from(uuid)))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(other) => Err(other.into()),
    }
}

/// Returns whether `player_id` is already recorded as a member of
/// `link_id`.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure.
pub fn is_link_member(
    connection: &Connection,
    link_id: LinkId,
    player_id: PlayerId,
) -> Result<bool, StoreError> {
    let count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM link_members WHERE link_id = ?1 AND player_id = ?2",
        params![link_id.to_string(), player_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Adds `player_id` to `link_id`'s membership without emitting a domain
/// event, for the "player joins an already-existing link" case: only the
/// link's *creation* is an auditable domain event, not each subsequent
/// join.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure.
pub fn add_link_member(
    tx: &Transaction<'_>,
    link_id: LinkId,
    player_id: PlayerId,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT OR IGNORE INTO link_members (link_id, player_id) VALUES (?1, ?2)",
        params![link_id.to_string(), player_id.to_string()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rusqlite::params;

    use soullink_core::identifiers::PlayerId;
    use soullink_core::identifiers::RouteId;
    use soullink_core::identifiers::RunId;

    use super::*;

    fn seed_run(connection: &Connection, run_id: RunId) {
        connection
            .execute(
                "INSERT INTO runs (id, display_name, rules_json, created_at) VALUES (?1, 'r', '{}', '')",
                params![run_id.to_string()],
            )
            .expect("seed run");
    }

    #[test]
    fn distinct_caught_players_reflects_insert_order() {
        let mut connection = crate::connection::open_in_memory().expect("open");
        let run_id = RunId::generate();
        seed_run(&connection, run_id);
        let route_id = RouteId::new(31);
        let player_a = PlayerId::generate();
        let player_b = PlayerId::generate();

        let tx = connection.transaction().expect("tx");
        tx.execute(
            "INSERT INTO route_catches (run_id, route_id, player_id, created_at) VALUES (?1, ?2, ?3, '1')",
            params![run_id.to_string(), route_id.get(), player_a.to_string()],
        )
        .expect("insert a");
        tx.execute(
            "INSERT INTO route_catches (run_id, route_id, player_id, created_at) VALUES (?1, ?2, ?3, '2')",
            params![run_id.to_string(), route_id.get(), player_b.to_string()],
        )
        .expect("insert b");

        let players = distinct_caught_players(&tx, run_id, route_id).expect("query");
        tx.commit().expect("commit");

        assert_eq!(players, vec![player_a, player_b]);
    }

    #[test]
    fn find_link_returns_none_when_absent() {
        let mut connection = crate::connection::open_in_memory().expect("open");
        let run_id = RunId::generate();
        seed_run(&connection, run_id);
        let tx = connection.transaction().expect("tx");
        let found = find_link(&tx, run_id, RouteId::new(20)).expect("query");
        assert_eq!(found, None);
    }
}
