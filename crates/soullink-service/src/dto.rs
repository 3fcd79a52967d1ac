// crates/soullink-service/src/dto.rs
// ============================================================================
// Module: SoulLink Service Wire Types
// Description: Request/response shapes for the ingestion, catch-up, and
//              admin HTTP surfaces.
// Purpose: Keep the externally-facing JSON shapes distinct from the domain
//          types they're built from or into; the wire schema is derived
//          from the domain event, never the other way around.
// Dependencies: serde, soullink-core
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use soullink_core::enums::BlockOrigin;
use soullink_core::events::EventEnvelope;
use soullink_core::events::EventPayload;
use soullink_core::identifiers::EventId;
use soullink_core::identifiers::FamilyId;
use soullink_core::identifiers::LinkId;
use soullink_core::registry::RulesConfig;

/// Body accepted by the ingestion endpoint.
///
/// Only the three player-originated variants (`Encounter`, `CatchResult`,
/// `Faint`) are legal here; the remaining four are system-synthesized and
/// a client submitting one is rejected as a validation error. Reusing
/// [`EventPayload`]'s own `#[serde(tag = "type")]` encoding means the wire
/// shape and the canonical domain shape are the same bytes for these three
/// variants, aside from the optional `occurred_at` field flattened in
/// alongside it.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    /// Client-observed occurrence time, if supplied. Falls back to the
    /// server's receipt time when absent.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub occurred_at: Option<OffsetDateTime>,
    /// The submitted payload, validated by [`IngestRequest::into_payload`].
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl IngestRequest {
    /// Returns the validated payload, rejecting system-synthesized variants
    /// and a fishing encounter missing its rod kind.
    ///
    /// # Errors
    ///
    /// Returns a human-readable rejection reason as `Err(String)`.
    pub fn into_payload(self) -> Result<EventPayload, String> {
        match &self.payload {
            EventPayload::Encounter(encounter) => {
                let requires_rod = encounter.method == soullink_core::enums::EncounterMethod::Fish;
                if requires_rod && encounter.rod_kind.is_none() {
                    return Err("fishing encounters require rod_kind".to_string());
                }
                if !requires_rod && encounter.rod_kind.is_some() {
                    return Err("rod_kind is only valid for fishing encounters".to_string());
                }
                Ok(self.payload)
            }
            EventPayload::CatchResult(_) | EventPayload::Faint(_) => Ok(self.payload),
            other => Err(format!("{} is not a client-submittable event type", other.type_name())),
        }
    }

    /// Returns the client-declared occurrence time, or the current time if
    /// none was supplied.
    #[must_use]
    pub fn occurred_at_or_now(&self) -> OffsetDateTime {
        self.occurred_at.unwrap_or_else(OffsetDateTime::now_utc)
    }
}

/// Summary of rules-engine side effects applied for one ingested event,
/// returned alongside the envelope location so a client can tell what
/// happened without re-deriving it from projection state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AppliedRules {
    /// Set when an encounter was rejected as a dupe under the blocklist.
    #[serde(skip_serializing_if = "is_false")]
    pub dupes_skip: bool,
    /// Set when a catch result finalized its originating first encounter.
    #[serde(skip_serializing_if = "is_false")]
    pub first_encounter_finalized: bool,
    /// Set when this request lost the finalization race for its route.
    #[serde(skip_serializing_if = "is_false")]
    pub finalization_race_lost: bool,
    /// Family newly added to, or upgraded on, the blocklist, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocklist_added: Option<FamilyId>,
    /// Origin recorded for `blocklist_added`, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocklist_origin: Option<BlockOrigin>,
    /// Soul link created or joined as a result of this request, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soul_link: Option<LinkId>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Response returned by the ingestion endpoint on success, and the shape
/// replayed verbatim (as stored JSON) for an idempotent resubmission.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    /// Identifier of the appended event.
    pub event_id: EventId,
    /// Sequence number assigned to the appended event.
    pub seq: u64,
    /// Rules-engine side effects applied.
    pub applied_rules: AppliedRules,
}

/// Query parameters accepted by the catch-up endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CatchUpQuery {
    /// Exclusive lower bound on sequence number. Defaults to 0.
    #[serde(default)]
    pub since_seq: u64,
    /// Maximum number of events to return. Defaults to 100, capped at 1000.
    pub limit: Option<u32>,
}

/// Default page size for catch-up queries.
pub const DEFAULT_CATCHUP_LIMIT: u32 = 100;
/// Maximum page size accepted for catch-up queries.
pub const MAX_CATCHUP_LIMIT: u32 = 1000;

/// Response returned by the catch-up endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CatchUpResponse {
    /// Page of events, ordered by sequence number ascending.
    pub events: Vec<EventEnvelope>,
    /// Highest sequence number currently stored for the run.
    pub latest_seq: u64,
    /// Whether more events remain beyond this page.
    pub has_more: bool,
}

/// Request body for creating a run.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRunRequest {
    /// Human-readable run name.
    pub display_name: String,
    /// Rules configuration; defaults to both dupes-clause and soul-link
    /// rules enabled.
    #[serde(default)]
    pub rules: RulesConfig,
}

/// Request body for creating a player within a run.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlayerRequest {
    /// Display name, unique within the run (case-insensitive).
    pub display_name: String,
    /// Game version label (e.g. `"HeartGold"`).
    pub game_label: String,
    /// Region label (e.g. `"Johto"`).
    pub region_label: String,
}

/// Response returned after creating a player: the one-time bearer token is
/// never retrievable again after this response.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePlayerResponse {
    /// Newly created player id.
    pub player_id: soullink_core::identifiers::PlayerId,
    /// One-time plaintext bearer token.
    pub token: String,
}

/// Response returned after rotating a player's token.
#[derive(Debug, Clone, Serialize)]
pub struct RotateTokenResponse {
    /// New plaintext bearer token.
    pub token: String,
}
