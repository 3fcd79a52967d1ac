// crates/soullink-core/src/registry.rs
// ============================================================================
// Module: SoulLink Run/Player Registry
// Description: Identity and membership types for runs and players
//.
// Purpose: Describe a run's rules configuration and its players' identity,
//          independent of how they are persisted.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A `Run`'s rules configuration is immutable once the run has accepted its
//! first event (enforced by the storage layer, not represented here). A
//! `Player`'s display name is immutable and unique per run
//! (case-insensitively); its token hash may be rotated.

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::PlayerId;
use crate::identifiers::RunId;

/// Rules configuration for a run. Immutable after the run's first event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Dupes-clause enabled (family blocked after first catch/finalize).
    pub dupes_clause: bool,
    /// Soul-link rule enabled (linked Pokemon share fate).
    pub soul_link: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            dupes_clause: true,
            soul_link: true,
        }
    }
}

/// A SoulLink run: a shared save-state tracked across its players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Run identifier.
    pub id: RunId,
    /// Display name for the run.
    pub display_name: String,
    /// Rules configuration, immutable after the first event.
    pub rules: RulesConfig,
}

/// A player within a run.
///
/// # Invariants
/// - `display_name` is unique per run, case-insensitively, and immutable
///   once created.
/// - Exactly one `token_hash` is active at a time; rotation replaces it in
///   place rather than creating a second credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Player identifier.
    pub id: PlayerId,
    /// Run this player belongs to.
    pub run_id: RunId,
    /// Immutable display name, unique per run (case-insensitive).
    pub display_name: String,
    /// In-game label (e.g. trainer name or game version marker).
    pub game_label: String,
    /// Region label (mirrors the run's reference-catalog region scoping).
    pub region_label: String,
    /// Current bearer-token hash. Rotatable; never logged or serialized
    /// over the wire outside of storage internals.
    #[serde(skip_serializing)]
    pub token_hash: String,
}
