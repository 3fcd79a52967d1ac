// crates/soullink-core/src/events.rs
// ============================================================================
// Module: SoulLink Domain Events
// Description: The closed seven-variant event schema and its envelope.
//// Purpose: Give every layer of the system one tagged-union source of truth
//          for what an event is, instead of dynamic variant dispatch.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! `EventPayload` is a closed set: it is never extended at runtime, and
//! every consumer (rules engine, projection engine, wire encoder) matches
//! on it exhaustively. The wire schema and the broadcast payload are both
//! derived from this type; neither is derived from the inbound request
//! shape.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::enums::BlockOrigin;
use crate::enums::EncounterMethod;
use crate::enums::EncounterOutcome;
use crate::enums::EncounterStatus;
use crate::enums::RodKind;
use crate::identifiers::EventId;
use crate::identifiers::FamilyId;
use crate::identifiers::LinkId;
use crate::identifiers::PlayerId;
use crate::identifiers::RouteId;
use crate::identifiers::RunId;
use crate::identifiers::SpeciesId;

// ============================================================================
// SECTION: Event payload variants
// ============================================================================

/// A wild or stationary encounter.
///
/// # Invariants
/// - `rod_kind` is `Some` iff `method == EncounterMethod::Fish`; the service
///   layer rejects payloads that violate this before they reach the rules
///   engine.
/// - `status`, `dupes_skip`, and `fe_finalized` are the rules engine's
///   computed decision, not client input: the ingestion service overwrites
///   any client-supplied values with [`crate::rules::evaluate_encounter`]'s
///   output before the event reaches the event store, so a stored or
///   broadcast envelope always carries the authoritative decision rather
///   than requiring a second projection query to discover it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterPayload {
    /// Route the encounter occurred on.
    pub route_id: RouteId,
    /// Species encountered.
    pub species_id: SpeciesId,
    /// Evolutionary family of the species encountered.
    pub family_id: FamilyId,
    /// Level of the encountered Pokemon.
    pub level: u8,
    /// Whether the encounter was shiny.
    pub shiny: bool,
    /// Method of encounter.
    pub method: EncounterMethod,
    /// Rod used, required iff `method == Fish`.
    pub rod_kind: Option<RodKind>,
    /// Computed status. See the struct-level invariant.
    #[serde(default = "default_encounter_status")]
    pub status: EncounterStatus,
    /// Computed dupe-skip flag. See the struct-level invariant.
    #[serde(default)]
    pub dupes_skip: bool,
    /// Computed first-encounter-finalized flag. Always `false` for an
    /// encounter: only a catch result finalizes. See the struct-level
    /// invariant.
    #[serde(default)]
    pub fe_finalized: bool,
}

/// Serde default for `EncounterPayload::status`: a client omitting it (the
/// normal case, since the engine overwrites it anyway) gets treated as a
/// first encounter pending the engine's decision.
fn default_encounter_status() -> EncounterStatus {
    EncounterStatus::FirstEncounter
}

impl EncounterPayload {
    /// Overwrites the computed fields with the rules engine's decision.
    pub fn apply_decision(&mut self, decision: crate::rules::EncounterDecision) {
        self.status = if decision.dupes_skip {
            EncounterStatus::DupeSkip
        } else {
            EncounterStatus::FirstEncounter
        };
        self.dupes_skip = decision.dupes_skip;
        self.fe_finalized = decision.fe_finalized;
    }
}

/// The result of a catch attempt following a prior encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchResultPayload {
    /// The encounter this catch result resolves. Canonical reference only;
    /// the legacy `(route_id, species_id)` shorthand is not accepted.
    pub encounter_id: EventId,
    /// Outcome of the catch attempt.
    pub outcome: EncounterOutcome,
}

/// A Pokemon, identified by its party key, has fainted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaintPayload {
    /// Stable per-player key identifying the fainted Pokemon.
    pub pokemon_key: String,
    /// Party slot index at the time of the faint, if known.
    pub party_slot_index: Option<u8>,
}

/// A soul link between two or more players on a route has been created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoulLinkCreatedPayload {
    /// Link identifier.
    pub link_id: LinkId,
    /// Route the link is scoped to.
    pub route_id: RouteId,
    /// Players participating in the link.
    pub participating_players: Vec<PlayerId>,
}

/// An existing soul link has been broken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoulLinkBrokenPayload {
    /// Link identifier.
    pub link_id: LinkId,
    /// Route the link was scoped to.
    pub route_id: RouteId,
    /// Players affected by the break.
    pub affected_players: Vec<PlayerId>,
}

/// A family has been added to the run-wide blocklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyBlockedPayload {
    /// Family being blocked.
    pub family_id: FamilyId,
    /// How the block was triggered.
    pub origin: BlockOrigin,
}

/// A player's first encounter on a route has been finalized, winning the
/// race against any other player's concurrent attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstEncounterFinalizedPayload {
    /// Route being finalized.
    pub route_id: RouteId,
    /// Player who finalized it.
    pub finalizing_player: PlayerId,
}

/// The closed set of domain event payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// See [`EncounterPayload`].
    Encounter(EncounterPayload),
    /// See [`CatchResultPayload`].
    CatchResult(CatchResultPayload),
    /// See [`FaintPayload`].
    Faint(FaintPayload),
    /// See [`SoulLinkCreatedPayload`].
    SoulLinkCreated(SoulLinkCreatedPayload),
    /// See [`SoulLinkBrokenPayload`].
    SoulLinkBroken(SoulLinkBrokenPayload),
    /// See [`FamilyBlockedPayload`].
    FamilyBlocked(FamilyBlockedPayload),
    /// See [`FirstEncounterFinalizedPayload`].
    FirstEncounterFinalized(FirstEncounterFinalizedPayload),
}

impl EventPayload {
    /// Returns the wire/storage discriminant for this payload.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Encounter(_) => "encounter",
            Self::CatchResult(_) => "catch_result",
            Self::Faint(_) => "faint",
            Self::SoulLinkCreated(_) => "soul_link_created",
            Self::SoulLinkBroken(_) => "soul_link_broken",
            Self::FamilyBlocked(_) => "family_blocked",
            Self::FirstEncounterFinalized(_) => "first_encounter_finalized",
        }
    }
}

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// An immutable, sequenced event as durably recorded by the event store.
///
/// # Invariants
/// - `sequence_number` is assigned exactly once, at append time, and is
///   unique and gap-free per `run_id`.
/// - The envelope is never modified or deleted outside of a full-run purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event identifier, unique within the run.
    pub event_id: EventId,
    /// Run this event belongs to.
    pub run_id: RunId,
    /// Player who originated this event.
    pub player_id: PlayerId,
    /// Client-observed occurrence time.
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
    /// Server-assigned storage time.
    #[serde(with = "time::serde::rfc3339")]
    pub stored_at: OffsetDateTime,
    /// Monotonic, gap-free sequence number assigned at append time.
    pub sequence_number: u64,
    /// The event payload.
    pub payload: EventPayload,
}
