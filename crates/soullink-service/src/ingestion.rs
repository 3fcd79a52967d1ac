// crates/soullink-service/src/ingestion.rs
// ============================================================================
// Module: SoulLink Ingestion Orchestration
// Description: The single request path from bearer-token verification
//              through durable append, projection, the soul-link creation
//              trigger, and live broadcast.
// Purpose: Give every ingestion entry point (HTTP today) one function that
//          already implements the full step sequence, instead of
//          duplicating transaction handling at each handler.
// Dependencies: rusqlite, soullink-broker, soullink-core, soullink-store-sqlite
// ============================================================================

//! ## Overview
//! Step order: verify token, verify player/run membership, idempotency
//! check, append + project inside one transaction, commit, broadcast,
//! store idempotency record. The soul-link creation trigger runs as an
//! explicit step between projecting a caught `CatchResult` and committing,
//! inside the same transaction.

use time::OffsetDateTime;

use soullink_core::enums::BlockOrigin;
use soullink_core::enums::EncounterOutcome;
use soullink_core::events::CatchResultPayload;
use soullink_core::events::EventEnvelope;
use soullink_core::events::EventPayload;
use soullink_core::events::SoulLinkCreatedPayload;
use soullink_core::identifiers::LinkId;
use soullink_core::identifiers::PlayerId;
use soullink_core::identifiers::RunId;
use soullink_store_sqlite::ProjectionOutcome;
use soullink_store_sqlite::StoreError;
use soullink_store_sqlite::event_store;
use soullink_store_sqlite::idempotency;
use soullink_store_sqlite::idempotency::IdempotencyCheck;
use soullink_store_sqlite::projections;
use soullink_store_sqlite::registry;
use soullink_store_sqlite::soul_link;

use crate::dto::AppliedRules;
use crate::dto::IngestRequest;
use crate::dto::IngestResponse;
use crate::error::ServiceError;
use crate::state::AppState;

/// Minimum number of distinct caught players on a route required to create
/// a soul link.
const SOUL_LINK_THRESHOLD: usize = 2;

/// Executes the full ingestion sequence for one client-submitted event.
///
/// # Errors
///
/// Returns [`ServiceError::Unauthorized`] if the bearer token does not match
/// the player, [`ServiceError::PlayerRunMismatch`] if the player is not a
/// member of the run, [`ServiceError::Validation`] if the idempotency key or
/// payload fails validation, [`ServiceError::IdempotencyKeyConflict`] if the
/// key was reused with a different body, and [`ServiceError::Store`] /
/// [`ServiceError::NotFound`] for store-layer failures.
pub async fn ingest_event(
    state: &AppState,
    run_id: RunId,
    player_id: PlayerId,
    bearer_token: &str,
    idempotency_key: Option<&str>,
    request: IngestRequest,
) -> Result<IngestResponse, ServiceError> {
    let mut conn = state.db.for_run(run_id).await?;

    if !registry::verify_player_token(&conn, run_id, player_id, bearer_token)? {
        return Err(ServiceError::Unauthorized);
    }
    registry::get_player(&conn, run_id, player_id)?.ok_or(ServiceError::PlayerRunMismatch)?;

    let key = idempotency_key
        .map(idempotency::validate_key)
        .transpose()
        .map_err(|err| ServiceError::Validation(err.to_string()))?;
    if let Some(key) = &key {
        match idempotency::check(&conn, run_id, player_id, key, &request.payload)? {
            IdempotencyCheck::Replay(response_json) => {
                return serde_json::from_str(&response_json).map_err(|err| {
                    ServiceError::Store(StoreError::MalformedIdempotencyKey(err.to_string()))
                });
            }
            IdempotencyCheck::KeyReusedWithDifferentBody => {
                return Err(ServiceError::IdempotencyKeyConflict);
            }
            IdempotencyCheck::Fresh => {}
        }
    }

    let occurred_at = request.occurred_at_or_now();
    let raw_payload = request.payload.clone();
    let mut validated = request.into_payload().map_err(ServiceError::Validation)?;

    let tx = conn.transaction().map_err(StoreError::from)?;
    if let EventPayload::Encounter(encounter) = &mut validated {
        let decision =
            projections::decide_encounter(&tx, run_id.to_string().as_str(), player_id, encounter)?;
        encounter.apply_decision(decision);
    }
    let envelope = event_store::append(&tx, run_id, player_id, occurred_at, validated)?;
    let outcome = projections::apply_event(&tx, &envelope)?;

    let mut applied_rules = AppliedRules::default();
    match (&envelope.payload, outcome) {
        (EventPayload::Encounter(_), ProjectionOutcome::EncounterDecision { dupes_skip }) => {
            applied_rules.dupes_skip = dupes_skip;
        }
        (EventPayload::CatchResult(catch), ProjectionOutcome::Applied) => {
            applied_rules.first_encounter_finalized = true;
            apply_catch_side_effects(&tx, run_id, &envelope, catch, &mut applied_rules)?;
        }
        (EventPayload::CatchResult(catch), ProjectionOutcome::ExpectedConflict(_)) => {
            applied_rules.finalization_race_lost = true;
            apply_catch_side_effects(&tx, run_id, &envelope, catch, &mut applied_rules)?;
        }
        _ => {}
    }

    let response = IngestResponse {
        event_id: envelope.event_id,
        seq: envelope.sequence_number,
        applied_rules,
    };

    if let Some(key) = &key {
        let response_json = serde_json::to_string(&response).map_err(|err| {
            ServiceError::Store(StoreError::MalformedIdempotencyKey(err.to_string()))
        })?;
        idempotency::store(&tx, run_id, player_id, key, &raw_payload, &response_json)?;
    }

    tx.commit().map_err(StoreError::from)?;

    if let Err(err) = state.broker.publish(run_id, envelope) {
        tracing::warn!(%err, "dropping broadcast for out-of-order publish");
    }

    Ok(response)
}

/// Runs the soul-link creation trigger and records blocklist-side
/// `applied_rules` fields after a caught `CatchResult` has been durably
/// projected, win or lose the route's finalization race: the trigger
/// counts every player who caught on the route, not only the finalizer.
fn apply_catch_side_effects(
    tx: &rusqlite::Transaction<'_>,
    run_id: RunId,
    envelope: &EventEnvelope,
    catch: &CatchResultPayload,
    applied_rules: &mut AppliedRules,
) -> Result<(), ServiceError> {
    if catch.outcome != EncounterOutcome::Caught {
        return Ok(());
    }

    let Some(encounter_envelope) = event_store::get_event_by_id(tx, run_id, catch.encounter_id)?
    else {
        return Ok(());
    };
    let EventPayload::Encounter(encounter) = &encounter_envelope.payload else {
        return Ok(());
    };

    applied_rules.blocklist_added = Some(encounter.family_id);
    applied_rules.blocklist_origin = Some(BlockOrigin::Caught);

    let route_id = encounter.route_id;
    let caught_players = soul_link::distinct_caught_players(tx, run_id, route_id)?;
    if caught_players.len() < SOUL_LINK_THRESHOLD {
        return Ok(());
    }

    match soul_link::find_link(tx, run_id, route_id)? {
        Some(link_id) => {
            if !soul_link::is_link_member(tx, link_id, envelope.player_id)? {
                soul_link::add_link_member(tx, link_id, envelope.player_id)?;
            }
            applied_rules.soul_link = Some(link_id);
        }
        None => {
            let link_id = LinkId::generate();
            let link_event = event_store::append(
                tx,
                run_id,
                envelope.player_id,
                OffsetDateTime::now_utc(),
                EventPayload::SoulLinkCreated(SoulLinkCreatedPayload {
                    link_id,
                    route_id,
                    participating_players: caught_players,
                }),
            )?;
            projections::apply_event(tx, &link_event)?;
            applied_rules.soul_link = Some(link_id);
        }
    }

    Ok(())
}
