// crates/soullink-core/src/lib.rs
// ============================================================================
// Module: SoulLink Core
// Description: Domain types and pure rules engine for the SoulLink tracker.
// Purpose: Provide the closed event schema, identifiers, and deterministic
//          decision logic shared by every other crate in the workspace.
// Dependencies: serde, serde_json, serde_jcs, sha2, thiserror, time, uuid
// ============================================================================

//! ## Overview
//! This crate has no I/O. It defines the identifiers, reference-catalog
//! types, closed event schema, and pure rules engine that the storage and
//! service crates build on. Nothing here reads a clock, touches a database,
//! or performs randomness: every function is a deterministic transform over
//! explicit inputs.

pub mod catalog;
pub mod enums;
pub mod events;
pub mod hashing;
pub mod identifiers;
pub mod registry;
pub mod rules;

pub use catalog::{RouteEntry, SpeciesEntry};
pub use enums::{BlockOrigin, EncounterMethod, EncounterOutcome, RodKind};
pub use events::{EventEnvelope, EventPayload};
pub use identifiers::{EventId, FamilyId, LinkId, PlayerId, RouteId, RunId, SpeciesId};
pub use registry::{Player, Run, RulesConfig};
pub use rules::{
    CatchDecision, EncounterDecision, FaintDecision, PlayerRouteState, RunState,
    apply_catch_result, evaluate_encounter, process_faint, process_family_blocked,
};
