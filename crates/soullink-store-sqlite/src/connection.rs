// crates/soullink-store-sqlite/src/connection.rs
// ============================================================================
// Module: SoulLink Store Connection
// Description: Connection configuration, pragmas, and schema management.
// Purpose: Open a durable SQLite connection with a concurrency model built
//          for a single writer and many readers (WAL, synchronous=NORMAL,
//          busy-timeout floor).
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! Every connection this crate opens gets the same pragmas: WAL journaling
//! so readers never block the writer, `synchronous = NORMAL` (safe under
//! WAL, faster than `FULL`), and a multi-second busy timeout so that
//! `SQLite`-level lock contention resolves by waiting rather than failing
//! immediately. [`StoreLocation`] plus [`open_at`] let a caller open more
//! than one independent connection to the same backing database — a file
//! in WAL mode, or a shared-cache in-memory database — which is what lets a
//! per-run connection pool give unrelated runs their own session instead of
//! contending for one.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;

use crate::error::StoreError;

/// Minimum busy timeout honored regardless of configuration.
pub const MIN_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a database physically lives, and so how a second, independent
/// connection to the same data is opened.
#[derive(Debug, Clone)]
pub enum StoreLocation {
    /// A durable file on disk, opened in WAL mode so multiple connections
    /// can read and write without serializing on one session.
    File(PathBuf),
    /// A named shared-cache in-memory database. Every connection opened
    /// against the same name sees the same data; the database itself is
    /// destroyed once the last connection to it closes, so a pool must
    /// keep at least one connection alive for as long as the location is
    /// in use.
    Memory(String),
}

impl StoreLocation {
    /// A fresh, uniquely named shared in-memory location, for tests that
    /// want the same multi-connection behavior as a real file without
    /// touching disk.
    #[must_use]
    pub fn new_memory() -> Self {
        Self::Memory(format!("soullink-{}", uuid::Uuid::new_v4()))
    }

    fn open_raw(&self) -> Result<Connection, StoreError> {
        match self {
            Self::File(path) => Ok(Connection::open(path)?),
            Self::Memory(name) => {
                let uri = format!("file:{name}?mode=memory&cache=shared");
                Ok(Connection::open_with_flags(
                    uri,
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_URI
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?)
            }
        }
    }
}

/// Opens a `SQLite` connection at `path` with durability pragmas applied,
/// creating the schema if it does not already exist.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] if the connection cannot be opened or the
/// schema cannot be created.
pub fn open(path: &Path, busy_timeout: Duration) -> Result<Connection, StoreError> {
    open_at(&StoreLocation::File(path.to_path_buf()), busy_timeout)
}

/// Opens a new connection to `location`, applying durability pragmas and
/// creating the schema if it does not already exist. Safe to call
/// repeatedly against the same location: that is the intended way to get a
/// second, independent session onto the same data.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] if the connection cannot be opened or the
/// schema cannot be created.
pub fn open_at(location: &StoreLocation, busy_timeout: Duration) -> Result<Connection, StoreError> {
    let connection = location.open_raw()?;
    apply_pragmas(&connection, location, busy_timeout.max(MIN_BUSY_TIMEOUT))?;
    run_migrations(&connection)?;
    Ok(connection)
}

/// Opens an in-memory `SQLite` connection for tests, with the schema
/// created and pragmas applied where they are meaningful for `:memory:`.
/// Private to its own connection: a second call never sees the same data,
/// which is fine for a test that only ever holds one connection open. Use
/// [`StoreLocation::new_memory`] plus [`open_at`] when a test needs more
/// than one connection onto the same in-memory data.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] if the schema cannot be created.
pub fn open_in_memory() -> Result<Connection, StoreError> {
    let connection = Connection::open_in_memory()?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    run_migrations(&connection)?;
    Ok(connection)
}

fn apply_pragmas(
    connection: &Connection,
    location: &StoreLocation,
    busy_timeout: Duration,
) -> Result<(), StoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    // WAL and synchronous=NORMAL are meaningless for an in-memory database
    // (SQLite silently ignores the journal-mode change there); skip them
    // rather than issue a pragma that does nothing.
    if matches!(location, StoreLocation::File(_)) {
        connection.execute_batch("PRAGMA journal_mode = WAL;")?;
        connection.execute_batch("PRAGMA synchronous = NORMAL;")?;
    }
    connection.busy_timeout(busy_timeout)?;
    Ok(())
}

/// Creates every table and index this crate needs. Idempotent: safe to
/// call on an existing database.
fn run_migrations(connection: &Connection) -> Result<(), StoreError> {
    connection.execute_batch(SCHEMA)?;
    Ok(())
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    rules_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS players (
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL REFERENCES runs(id),
    display_name TEXT NOT NULL,
    game_label TEXT NOT NULL,
    region_label TEXT NOT NULL,
    token_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (run_id, display_name COLLATE NOCASE)
);

CREATE INDEX IF NOT EXISTS ix_player_token_hash ON players(token_hash);

CREATE TABLE IF NOT EXISTS species (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    family_id INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_species_family_id ON species(family_id);

CREATE TABLE IF NOT EXISTS routes (
    id INTEGER PRIMARY KEY,
    label TEXT NOT NULL,
    region TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    event_id TEXT NOT NULL,
    run_id TEXT NOT NULL REFERENCES runs(id),
    player_id TEXT NOT NULL REFERENCES players(id),
    type TEXT NOT NULL,
    occurred_at TEXT NOT NULL,
    stored_at TEXT NOT NULL,
    seq INTEGER NOT NULL,
    payload_json TEXT NOT NULL,
    PRIMARY KEY (run_id, event_id),
    UNIQUE (run_id, seq)
);

CREATE INDEX IF NOT EXISTS ix_event_run_seq ON events(run_id, seq);
CREATE INDEX IF NOT EXISTS ix_event_run_player_created ON events(run_id, player_id, stored_at);
CREATE INDEX IF NOT EXISTS ix_event_type_created ON events(type, stored_at);

CREATE TABLE IF NOT EXISTS encounter_index (
    run_id TEXT NOT NULL,
    encounter_id TEXT NOT NULL,
    player_id TEXT NOT NULL,
    route_id INTEGER NOT NULL,
    family_id INTEGER NOT NULL,
    PRIMARY KEY (run_id, encounter_id)
);

CREATE TABLE IF NOT EXISTS route_progress (
    run_id TEXT NOT NULL,
    player_id TEXT NOT NULL,
    route_id INTEGER NOT NULL,
    finalized INTEGER NOT NULL DEFAULT 0,
    first_encounter_family_id INTEGER,
    last_encounter_method TEXT,
    last_rod_kind TEXT,
    last_update TEXT NOT NULL,
    PRIMARY KEY (run_id, player_id, route_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS ix_route_progress_fe_unique
    ON route_progress(run_id, route_id) WHERE finalized = 1;

CREATE TABLE IF NOT EXISTS blocklist (
    run_id TEXT NOT NULL,
    family_id INTEGER NOT NULL,
    origin TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (run_id, family_id)
);

CREATE TABLE IF NOT EXISTS party_status (
    run_id TEXT NOT NULL,
    player_id TEXT NOT NULL,
    pokemon_key TEXT NOT NULL,
    alive INTEGER NOT NULL,
    last_update TEXT NOT NULL,
    PRIMARY KEY (run_id, player_id, pokemon_key)
);

CREATE TABLE IF NOT EXISTS links (
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    route_id INTEGER NOT NULL,
    UNIQUE (run_id, route_id)
);

CREATE TABLE IF NOT EXISTS link_members (
    link_id TEXT NOT NULL REFERENCES links(id),
    player_id TEXT NOT NULL,
    PRIMARY KEY (link_id, player_id)
);

CREATE TABLE IF NOT EXISTS route_catches (
    run_id TEXT NOT NULL,
    route_id INTEGER NOT NULL,
    player_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (run_id, route_id, player_id)
);

CREATE TABLE IF NOT EXISTS idempotency_keys (
    key TEXT NOT NULL,
    run_id TEXT NOT NULL,
    player_id TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    response_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (key, run_id, player_id)
);

CREATE INDEX IF NOT EXISTS ix_idempotency_created_at ON idempotency_keys(created_at);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_applies_cleanly_twice() {
        let connection = open_in_memory().expect("open");
        run_migrations(&connection).expect("idempotent re-run");
    }

    #[test]
    fn shared_memory_location_is_visible_across_independent_connections() {
        let location = StoreLocation::new_memory();
        // The first connection must stay open: SQLite tears down a
        // shared-cache in-memory database once its last connection closes.
        let keepalive = open_at(&location, MIN_BUSY_TIMEOUT).expect("open first");
        keepalive
            .execute(
                "INSERT INTO runs (id, display_name, rules_json, created_at)
                 VALUES ('r1', 'Run', '{}', '')",
                [],
            )
            .expect("insert via first connection");

        let second = open_at(&location, MIN_BUSY_TIMEOUT).expect("open second");
        let display_name: String = second
            .query_row("SELECT display_name FROM runs WHERE id = 'r1'", [], |row| row.get(0))
            .expect("read via second connection");
        assert_eq!(display_name, "Run");
    }
}
