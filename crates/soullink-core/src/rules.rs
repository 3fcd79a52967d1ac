// crates/soullink-core/src/rules.rs
// ============================================================================
// Module: SoulLink Rules Engine
// Description: Pure functions implementing dupes-clause and soul-link
//              decision logic.
// Purpose: Classify encounter and catch-result events deterministically,
//          with no I/O, clock reads, or randomness.
// Dependencies: crate::enums, crate::events, crate::identifiers
// ============================================================================

//! ## Overview
//! Every function here takes an explicit [`RunState`] snapshot and an event,
//! and returns a decision describing what the projection layer should do.
//! Cross-player route-duplicate detection requires data this crate does not
//! have (which players have finalized which routes); the projection layer
//! supplies that via `cross_player_lookup` closures passed into
//! [`evaluate_encounter`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;

use thiserror::Error;

use crate::enums::BlockOrigin;
use crate::enums::EncounterMethod;
use crate::enums::EncounterOutcome;
use crate::enums::RodKind;
use crate::events::CatchResultPayload;
use crate::events::EncounterPayload;
use crate::identifiers::EventId;
use crate::identifiers::FamilyId;
use crate::identifiers::PlayerId;
use crate::identifiers::RouteId;

// ============================================================================
// SECTION: Run state
// ============================================================================

/// Per-player, per-route encounter state needed for rule evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerRouteState {
    /// Whether this player has finalized a first encounter on this route.
    pub fe_finalized: bool,
    /// Family of the first encounter on this route, if any.
    pub first_encounter_family_id: Option<FamilyId>,
    /// Method of the most recent encounter on this route, if any.
    pub last_encounter_method: Option<EncounterMethod>,
    /// Rod kind of the most recent fishing encounter, if any.
    pub last_rod_kind: Option<RodKind>,
}

/// Immutable snapshot of the state the rules engine needs: the run-wide
/// blocklist and per-(player, route) progress.
///
/// Every mutator returns a new `RunState` rather than mutating in place;
/// the projection layer is responsible for persisting the result.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    blocked_families: HashSet<FamilyId>,
    player_routes: HashMap<(PlayerId, RouteId), PlayerRouteState>,
}

impl RunState {
    /// Builds a `RunState` from its constituent parts.
    #[must_use]
    pub fn new(
        blocked_families: HashSet<FamilyId>,
        player_routes: HashMap<(PlayerId, RouteId), PlayerRouteState>,
    ) -> Self {
        Self {
            blocked_families,
            player_routes,
        }
    }

    /// Returns whether the given family is currently blocked run-wide.
    #[must_use]
    pub fn is_family_blocked(&self, family_id: FamilyId) -> bool {
        self.blocked_families.contains(&family_id)
    }

    /// Returns the route state for a player/route pair, defaulting to an
    /// empty state if none is recorded yet.
    #[must_use]
    pub fn route_state(&self, player_id: PlayerId, route_id: RouteId) -> PlayerRouteState {
        self.player_routes
            .get(&(player_id, route_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns a new state with the given family added to the blocklist.
    #[must_use]
    pub fn with_blocked_family(&self, family_id: FamilyId) -> Self {
        let mut blocked_families = self.blocked_families.clone();
        blocked_families.insert(family_id);
        Self {
            blocked_families,
            player_routes: self.player_routes.clone(),
        }
    }

    /// Returns a new state with the given player/route state recorded.
    #[must_use]
    pub fn with_route_state(
        &self,
        player_id: PlayerId,
        route_id: RouteId,
        state: PlayerRouteState,
    ) -> Self {
        let mut player_routes = self.player_routes.clone();
        player_routes.insert((player_id, route_id), state);
        Self {
            blocked_families: self.blocked_families.clone(),
            player_routes,
        }
    }
}

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Decision produced by [`evaluate_encounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncounterDecision {
    /// Whether this encounter is a dupe-skip.
    pub dupes_skip: bool,
    /// Whether this encounter finalizes a first encounter. Always `false`:
    /// encounters never finalize on their own, only catch results do.
    pub fe_finalized: bool,
}

impl EncounterDecision {
    /// Whether this encounter should create or update a route-progress row.
    /// A dupe-skipped encounter creates no row at all.
    #[must_use]
    pub const fn should_create_route_progress(&self) -> bool {
        !self.dupes_skip
    }
}

/// Decision produced by [`apply_catch_result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchDecision {
    /// Always `true`: a catch result always finalizes the first encounter
    /// for its (player, route), win or lose the race.
    pub fe_finalized: bool,
    /// Family to add to the blocklist, with origin, if the catch succeeded.
    pub blocklist_add: Option<(FamilyId, BlockOrigin)>,
}

/// Decision produced by [`process_faint`]. Currently carries no data: party
/// status is updated directly by the projection layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaintDecision;

/// Errors raised while applying a catch result.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RulesError {
    /// The referenced encounter could not be resolved by the caller-supplied
    /// lookup function.
    #[error("failed to resolve encounter {0}")]
    EncounterNotFound(EventId),
    /// The catch result's player does not match the original encounter's
    /// player.
    #[error("catch result player does not match encounter {0}'s player")]
    PlayerMismatch(EventId),
}

/// Resolves an encounter id to the `(player, route, family)` it was
/// recorded against. Supplied by the projection layer, which has access to
/// the event store or an encounter index; this crate has no storage access.
pub trait EncounterLookup {
    /// Resolves an encounter, or `None` if it is not known.
    fn resolve(&self, encounter_id: EventId) -> Option<(PlayerId, RouteId, FamilyId)>;
}

impl<F> EncounterLookup for F
where
    F: Fn(EventId) -> Option<(PlayerId, RouteId, FamilyId)>,
{
    fn resolve(&self, encounter_id: EventId) -> Option<(PlayerId, RouteId, FamilyId)> {
        self(encounter_id)
    }
}

// ============================================================================
// SECTION: Pure rule functions
// ============================================================================

/// Evaluates an encounter under the dupes-clause rules.
///
/// Rules:
/// 1. If the species' family is already blocked run-wide, the encounter is
///    a dupe-skip.
/// 2. Otherwise, it is a first encounter. It is never finalized here —
///    finalization only happens on the corresponding catch result — so the
///    cross-player route-duplicate check (whether another player has
///    already finalized this family on this route) is left to the
///    projection layer, which can see all players' finalized state.
///
/// A fishing rod is tracked on the payload but never bypasses a family
/// block.
#[must_use]
pub fn evaluate_encounter(state: &RunState, payload: &EncounterPayload) -> EncounterDecision {
    if state.is_family_blocked(payload.family_id) {
        return EncounterDecision {
            dupes_skip: true,
            fe_finalized: false,
        };
    }

    EncounterDecision {
        dupes_skip: false,
        fe_finalized: false,
    }
}

/// Applies a catch result, always finalizing the originating first
/// encounter and, on a successful catch, blocking the family.
///
/// # Errors
///
/// Returns [`RulesError::EncounterNotFound`] if `lookup` cannot resolve the
/// referenced encounter, or [`RulesError::PlayerMismatch`] if the resolved
/// encounter belongs to a different player than the catch result.
pub fn apply_catch_result(
    payload: &CatchResultPayload,
    event_player_id: PlayerId,
    lookup: &impl EncounterLookup,
) -> Result<CatchDecision, RulesError> {
    let (encounter_player_id, _route_id, family_id) = lookup
        .resolve(payload.encounter_id)
        .ok_or(RulesError::EncounterNotFound(payload.encounter_id))?;

    if encounter_player_id != event_player_id {
        return Err(RulesError::PlayerMismatch(payload.encounter_id));
    }

    let blocklist_add = matches!(payload.outcome, EncounterOutcome::Caught)
        .then_some((family_id, BlockOrigin::Caught));

    Ok(CatchDecision {
        fe_finalized: true,
        blocklist_add,
    })
}

/// Applies a family-blocked event, returning the updated run state.
#[must_use]
pub fn process_family_blocked(state: &RunState, family_id: FamilyId) -> RunState {
    state.with_blocked_family(family_id)
}

/// Applies a faint event. Currently a no-op for run state: party status is
/// tracked independently by the projection layer.
#[must_use]
pub fn process_faint() -> FaintDecision {
    FaintDecision
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(n: i64) -> FamilyId {
        FamilyId::new(n)
    }

    fn route(n: i64) -> RouteId {
        RouteId::new(n)
    }

    fn encounter(family_id: FamilyId, route_id: RouteId) -> EncounterPayload {
        EncounterPayload {
            route_id,
            species_id: crate::identifiers::SpeciesId::new(family_id.get()),
            family_id,
            level: 5,
            shiny: false,
            method: EncounterMethod::Grass,
            rod_kind: None,
            status: crate::enums::EncounterStatus::FirstEncounter,
            dupes_skip: false,
            fe_finalized: false,
        }
    }

    #[test]
    fn blocked_family_is_always_dupe_skip() {
        let state = RunState::default().with_blocked_family(family(25));
        let decision = evaluate_encounter(&state, &encounter(family(25), route(31)));
        assert!(decision.dupes_skip);
        assert!(!decision.fe_finalized);
    }

    #[test]
    fn unblocked_family_is_first_encounter_never_finalized() {
        let state = RunState::default();
        let decision = evaluate_encounter(&state, &encounter(family(1), route(1)));
        assert!(!decision.dupes_skip);
        assert!(!decision.fe_finalized);
        assert!(decision.should_create_route_progress());
    }

    #[test]
    fn fishing_rod_never_bypasses_family_block() {
        let state = RunState::default().with_blocked_family(family(129));
        let mut payload = encounter(family(129), route(32));
        payload.method = EncounterMethod::Fish;
        payload.rod_kind = Some(RodKind::Super);
        let decision = evaluate_encounter(&state, &payload);
        assert!(decision.dupes_skip);
    }

    #[test]
    fn catch_result_always_finalizes_and_blocks_only_when_caught() {
        let encounter_id = EventId::generate();
        let player_id = PlayerId::generate();
        let route_id = route(20);
        let family_id = family(50);
        let lookup = |id: EventId| {
            (id == encounter_id).then_some((player_id, route_id, family_id))
        };

        let caught = apply_catch_result(
            &CatchResultPayload {
                encounter_id,
                outcome: EncounterOutcome::Caught,
            },
            player_id,
            &lookup,
        )
        .expect("resolves");
        assert!(caught.fe_finalized);
        assert_eq!(caught.blocklist_add, Some((family_id, BlockOrigin::Caught)));

        let fled = apply_catch_result(
            &CatchResultPayload {
                encounter_id,
                outcome: EncounterOutcome::Fled,
            },
            player_id,
            &lookup,
        )
        .expect("resolves");
        assert!(fled.fe_finalized);
        assert_eq!(fled.blocklist_add, None);
    }

    #[test]
    fn catch_result_player_mismatch_is_rejected() {
        let encounter_id = EventId::generate();
        let owner = PlayerId::generate();
        let impostor = PlayerId::generate();
        let lookup = |id: EventId| (id == encounter_id).then_some((owner, route(1), family(1)));

        let result = apply_catch_result(
            &CatchResultPayload {
                encounter_id,
                outcome: EncounterOutcome::Caught,
            },
            impostor,
            &lookup,
        );
        assert_eq!(result, Err(RulesError::PlayerMismatch(encounter_id)));
    }

    #[test]
    fn catch_result_unknown_encounter_is_rejected() {
        let encounter_id = EventId::generate();
        let lookup = |_id: EventId| None;
        let result = apply_catch_result(
            &CatchResultPayload {
                encounter_id,
                outcome: EncounterOutcome::Caught,
            },
            PlayerId::generate(),
            &lookup,
        );
        assert_eq!(result, Err(RulesError::EncounterNotFound(encounter_id)));
    }
}
