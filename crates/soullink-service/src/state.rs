// crates/soullink-service/src/state.rs
// ============================================================================
// Module: SoulLink Service State
// Description: Shared application state threaded through every handler.
// Purpose: Hold the per-run connection pool and the live broadcast registry
//          behind one cheap-to-clone handle.
// Dependencies: rusqlite, soullink-broker, soullink-config,
//               soullink-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! Sequence assignment and projection application need per-run
//! serialization, not serialization across the whole service: two unrelated
//! runs ingesting concurrently must not wait on each other. [`ConnectionPool`]
//! gives each run its own `SQLite` connection, opened lazily on first use and
//! cached behind a `tokio::sync::Mutex` that the run's requests then queue
//! on. Every connection is opened against the same [`StoreLocation`] — a
//! file in WAL mode, or a shared-cache in-memory database for tests — so
//! they all see the same data while never blocking on each other's locks
//! beyond what `SQLite` itself imposes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::PoisonError;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

use soullink_broker::Broker;
use soullink_config::SoullinkConfig;
use soullink_core::identifiers::RunId;
use soullink_store_sqlite::StoreError;
use soullink_store_sqlite::StoreLocation;
use soullink_store_sqlite::open_at;

/// A run's dedicated connection, held for the duration of one request.
pub type RunConnection = OwnedMutexGuard<Connection>;

/// Opens and caches one `SQLite` connection per run, so unrelated runs
/// never contend for the same lock.
pub struct ConnectionPool {
    location: StoreLocation,
    busy_timeout: Duration,
    runs: StdMutex<HashMap<RunId, Arc<Mutex<Connection>>>>,
    /// Keeps a shared-cache in-memory location alive for the pool's
    /// lifetime; a no-op for a file-backed location.
    _keepalive: Connection,
}

impl ConnectionPool {
    /// Opens a pool rooted at `location`, eagerly opening (and keeping
    /// open) one bootstrap connection to create the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the bootstrap connection cannot be opened.
    pub fn open(location: StoreLocation, busy_timeout: Duration) -> Result<Self, StoreError> {
        let keepalive = open_at(&location, busy_timeout)?;
        Ok(Self {
            location,
            busy_timeout,
            runs: StdMutex::new(HashMap::new()),
            _keepalive: keepalive,
        })
    }

    /// Returns `run_id`'s dedicated connection, opening and caching a new
    /// one on first use. Holding the returned guard blocks only other
    /// callers for the same run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a new connection needs to be opened and
    /// fails.
    pub async fn for_run(&self, run_id: RunId) -> Result<RunConnection, StoreError> {
        let handle = self.handle_for(run_id)?;
        Ok(handle.lock_owned().await)
    }

    /// Opens a short-lived connection not tied to any run, for operations
    /// (creating a run) that happen before a run id exists to key a
    /// pooled connection on.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the connection cannot be opened.
    pub fn untracked(&self) -> Result<Connection, StoreError> {
        open_at(&self.location, self.busy_timeout)
    }

    fn handle_for(&self, run_id: RunId) -> Result<Arc<Mutex<Connection>>, StoreError> {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = runs.get(&run_id) {
            return Ok(Arc::clone(handle));
        }
        let connection = open_at(&self.location, self.busy_timeout)?;
        let handle = Arc::new(Mutex::new(connection));
        runs.insert(run_id, Arc::clone(&handle));
        Ok(handle)
    }
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Per-run connection pool.
    pub db: Arc<ConnectionPool>,
    /// Per-run live broadcast registry.
    pub broker: Broker,
    /// Effective runtime configuration.
    pub config: Arc<SoullinkConfig>,
}

impl AppState {
    /// Builds application state, opening the bootstrap connection to
    /// `location` and creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the bootstrap connection cannot be opened.
    pub fn new(location: StoreLocation, config: SoullinkConfig) -> Result<Self, StoreError> {
        let db = ConnectionPool::open(location, config.busy_timeout())?;
        let broker = Broker::with_capacity(config.broadcast_channel_capacity);
        Ok(Self {
            db: Arc::new(db),
            broker,
            config: Arc::new(config),
        })
    }
}
