// crates/soullink-store-sqlite/src/lib.rs
// ============================================================================
// Module: SoulLink SQLite Store
// Description: Durable event store, projection engine, idempotency layer,
//              registry, and admin rebuild, all backed by SQLite.
// Purpose: Entry point re-exporting the public surface consumed by
//          soullink-service and soullink-cli.
// Dependencies: rusqlite, soullink-core
// ============================================================================

pub mod admin;
pub mod connection;
pub mod error;
pub mod event_store;
pub mod idempotency;
pub mod projections;
pub mod registry;
pub mod soul_link;

pub use admin::EventStoreStats;
pub use connection::MIN_BUSY_TIMEOUT;
pub use connection::StoreLocation;
pub use connection::open;
pub use connection::open_at;
pub use connection::open_in_memory;
pub use error::StoreError;
pub use event_store::EventQuery;
pub use idempotency::IdempotencyCheck;
pub use projections::ConflictReason;
pub use projections::ProjectionOutcome;
pub use soul_link::add_link_member;
pub use soul_link::distinct_caught_players;
pub use soul_link::find_link;
pub use soul_link::is_link_member;
