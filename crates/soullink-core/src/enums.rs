// crates/soullink-core/src/enums.rs
// ============================================================================
// Module: SoulLink Closed Enumerations
// Description: Fixed-vocabulary enums shared by event payloads and
//              projections.
// Purpose: Give the closed event schema a single, non-extensible source of
//          truth for its enumerated fields.
// Dependencies: serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

/// How an encounter occurred in-game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterMethod {
    /// Tall-grass or cave encounter.
    Grass,
    /// Surfing encounter.
    Surf,
    /// Fishing encounter (requires a [`RodKind`]).
    Fish,
    /// Stationary/gift encounter.
    Static,
    /// Method could not be determined by the source watcher.
    Unknown,
}

/// Fishing rod used for a [`EncounterMethod::Fish`] encounter.
///
/// Tracked for potential future rule extensions; never used to bypass a
/// family block (see [`crate::rules::evaluate_encounter`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RodKind {
    /// Old Rod.
    Old,
    /// Good Rod.
    Good,
    /// Super Rod.
    Super,
}

/// Outcome of a catch attempt following an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterOutcome {
    /// The Pokemon was caught.
    Caught,
    /// The Pokemon fled before a ball could be thrown.
    Fled,
    /// The Pokemon, or the player's own Pokemon, was knocked out.
    Ko,
    /// The catch attempt failed (broke free, ran out of balls, etc).
    Failed,
}

/// Origin of a blocklist entry, used to resolve upgrade priority.
///
/// Priority order (low to high): `Faint` < `FirstEncounter` < `Caught`. A
/// newly observed origin replaces the stored one only if strictly higher
/// priority (see [`BlockOrigin::priority`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockOrigin {
    /// The family was blocked because a linked Pokemon fainted.
    Faint,
    /// The family was blocked because a player finalized a first encounter.
    FirstEncounter,
    /// The family was blocked because a Pokemon of it was caught.
    Caught,
}

/// Computed status of an encounter, assigned by the rules engine.
///
/// Never client-supplied: the ingestion service always overwrites whatever
/// an inbound request carries with the engine's own decision before the
/// event is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterStatus {
    /// First encounter with this family on this route, not yet finalized.
    FirstEncounter,
    /// Rejected under the dupes clause: the family was already blocked.
    DupeSkip,
}

impl BlockOrigin {
    /// Returns this origin's priority for upgrade comparisons.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Faint => 1,
            Self::FirstEncounter => 2,
            Self::Caught => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_origin_priority_is_monotone_caught_highest() {
        assert!(BlockOrigin::Faint.priority() < BlockOrigin::FirstEncounter.priority());
        assert!(BlockOrigin::FirstEncounter.priority() < BlockOrigin::Caught.priority());
    }

    #[test]
    fn encounter_method_serializes_snake_case() {
        let json = serde_json::to_string(&EncounterMethod::Fish).expect("serialize");
        assert_eq!(json, "\"fish\"");
    }
}
