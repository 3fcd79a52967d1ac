// crates/soullink-store-sqlite/src/projections.rs
// ============================================================================
// Module: SoulLink Projection Engine
// Description: Materializes read models from appended events, with
//              savepoint-isolated handling of the two known expected races.
//// Purpose: Turn a durable event into the read-model side effects the rest
//          of the system queries, calling back into the pure rules engine
//          for authoritative status rather than re-deriving it ad hoc.
// Dependencies: rusqlite, soullink-core
// ============================================================================

//! ## Overview
//! Two projection writes are expected to race under concurrent play: a
//! player finalizing a route's first encounter (enforced by the partial
//! unique index on `route_progress`) and two family-blocked origins
//! landing on the same family at once (enforced by `blocklist`'s primary
//! key). Both are wrapped in a `SQLite` savepoint via `rusqlite::Savepoint`
//! so that the constraint violation rolls back only the inner write, not
//! the whole ingestion transaction.
//!
//! Every handler here is replay-safe: re-applying the same event twice
//! (as happens during [`crate::admin::rebuild_all`]) produces the same
//! read-model state, which is what makes full-stream replay a valid
//! recovery path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::ErrorCode;
use rusqlite::Transaction;
use rusqlite::params;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use soullink_core::enums::BlockOrigin;
use soullink_core::events::CatchResultPayload;
use soullink_core::events::EncounterPayload;
use soullink_core::events::EventEnvelope;
use soullink_core::events::EventPayload;
use soullink_core::events::FaintPayload;
use soullink_core::events::FamilyBlockedPayload;
use soullink_core::events::FirstEncounterFinalizedPayload;
use soullink_core::events::SoulLinkBrokenPayload;
use soullink_core::events::SoulLinkCreatedPayload;
use soullink_core::identifiers::EventId;
use soullink_core::identifiers::FamilyId;
use soullink_core::identifiers::PlayerId;
use soullink_core::identifiers::RouteId;
use soullink_core::rules;
use soullink_core::rules::EncounterDecision;
use soullink_core::rules::RunState;

use crate::error::StoreError;

// ============================================================================
// SECTION: Outcome types
// ============================================================================

/// Result of applying a single event's projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    /// The projection write landed without contention.
    Applied,
    /// An expected race was detected and resolved in the loser's favor;
    /// not an error, but worth surfacing to the caller for logging.
    ExpectedConflict(ConflictReason),
    /// An encounter was projected; `dupes_skip` reports whether the rules
    /// engine (plus the cross-player route check) classified it as a
    /// dupe-skip, which the ingestion service surfaces in `applied_rules`.
    EncounterDecision {
        /// Whether this encounter was a dupe-skip.
        dupes_skip: bool,
    },
}

/// Which documented race [`ProjectionOutcome::ExpectedConflict`] resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// Another player already finalized this route.
    RouteAlreadyFinalized,
    /// The family was already on the blocklist (origin may still have
    /// been upgraded).
    FamilyAlreadyBlocked,
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Applies `envelope`'s projections within `tx`.
///
/// # Errors
///
/// Returns [`StoreError`] for any unexpected database failure or a rules
/// engine rejection (the latter should never occur for durably appended
/// events and indicates a fatal inconsistency).
pub fn apply_event(
    tx: &Transaction<'_>,
    envelope: &EventEnvelope,
) -> Result<ProjectionOutcome, StoreError> {
    match &envelope.payload {
        EventPayload::Encounter(payload) => handle_encounter(tx, envelope, payload),
        EventPayload::CatchResult(payload) => handle_catch_result(tx, envelope, payload),
        EventPayload::Faint(payload) => handle_faint(tx, envelope, payload),
        EventPayload::SoulLinkCreated(payload) => {
            handle_soul_link_created(tx, &envelope.run_id.to_string(), payload)
        }
        EventPayload::SoulLinkBroken(payload) => handle_soul_link_broken(tx, payload),
        EventPayload::FamilyBlocked(payload) => {
            handle_family_blocked(tx, &envelope.run_id.to_string(), payload)
        }
        EventPayload::FirstEncounterFinalized(payload) => {
            handle_first_encounter_finalized(tx, &envelope.run_id.to_string(), payload)
        }
    }
}

// ============================================================================
// SECTION: Per-event handlers
// ============================================================================

/// Computes the rules-engine decision for an encounter against the run's
/// current projection state, without applying any side effects.
///
/// Called twice per encounter by design: once by the ingestion service
/// before the event is appended, so the stored/broadcast envelope carries
/// the engine's decision rather than a client-supplied placeholder, and
/// again by [`handle_encounter`] when the now-decided event is projected.
/// Both calls run inside the same transaction against unchanged state, so
/// they agree.
///
/// # Errors
///
/// Returns [`StoreError`] on unexpected database failure.
pub fn decide_encounter(
    tx: &Transaction<'_>,
    run_id: &str,
    player_id: PlayerId,
    payload: &EncounterPayload,
) -> Result<EncounterDecision, StoreError> {
    let blocked = is_family_blocked(tx, run_id, payload.family_id)?;
    let state = if blocked {
        RunState::default().with_blocked_family(payload.family_id)
    } else {
        RunState::default()
    };
    let mut decision = rules::evaluate_encounter(&state, payload);

    // The pure engine only sees run-wide blocking; the cross-player route
    // dupe rule (another player already finalized this exact family on
    // this route) needs data scoped across players, which only the
    // projection layer has access to.
    if !decision.dupes_skip
        && route_already_finalized_by_other_player(tx, run_id, player_id, payload.route_id, payload.family_id)?
    {
        decision = EncounterDecision {
            dupes_skip: true,
            fe_finalized: false,
        };
    }

    Ok(decision)
}

fn handle_encounter(
    tx: &Transaction<'_>,
    envelope: &EventEnvelope,
    payload: &EncounterPayload,
) -> Result<ProjectionOutcome, StoreError> {
    let decision = decide_encounter(tx, envelope.run_id.to_string().as_str(), envelope.player_id, payload)?;

    // The encounter index is populated unconditionally: a later catch
    // result must be able to resolve this encounter even if it was a
    // dupe-skip (the client may still submit a catch attempt before it
    // learns the skip happened).
    tx.execute(
        "INSERT OR REPLACE INTO encounter_index (run_id, encounter_id, player_id, route_id, family_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            envelope.run_id.to_string(),
            envelope.event_id.to_string(),
            envelope.player_id.to_string(),
            payload.route_id.get(),
            payload.family_id.get(),
        ],
    )?;

    if !decision.should_create_route_progress() {
        return Ok(ProjectionOutcome::EncounterDecision { dupes_skip: true });
    }

    let rod_kind = payload.rod_kind.map(|kind| format!("{kind:?}").to_lowercase());
    tx.execute(
        "INSERT INTO route_progress
            (run_id, player_id, route_id, finalized, first_encounter_family_id, last_encounter_method, last_rod_kind, last_update)
         VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7)
         ON CONFLICT(run_id, player_id, route_id) DO UPDATE SET
            last_encounter_method = excluded.last_encounter_method,
            last_rod_kind = excluded.last_rod_kind,
            last_update = excluded.last_update
         WHERE route_progress.finalized = 0",
        params![
            envelope.run_id.to_string(),
            envelope.player_id.to_string(),
            payload.route_id.get(),
            payload.family_id.get(),
            format!("{:?}", payload.method).to_lowercase(),
            rod_kind,
            now_rfc3339(),
        ],
    )?;

    Ok(ProjectionOutcome::EncounterDecision { dupes_skip: false })
}

fn handle_catch_result(
    tx: &Transaction<'_>,
    envelope: &EventEnvelope,
    payload: &CatchResultPayload,
) -> Result<ProjectionOutcome, StoreError> {
    let lookup = |encounter_id: EventId| resolve_encounter(tx, envelope.run_id.to_string().as_str(), encounter_id);
    let decision = rules::apply_catch_result(payload, envelope.player_id, &lookup)?;

    let (_, route_id, _) = resolve_encounter(tx, envelope.run_id.to_string().as_str(), payload.encounter_id)
        .ok_or(rules::RulesError::EncounterNotFound(payload.encounter_id))?;

    let finalize_outcome = if decision.fe_finalized {
        finalize_route_progress(tx, envelope.run_id.to_string().as_str(), envelope.player_id, route_id)?
    } else {
        ProjectionOutcome::Applied
    };

    if let Some((family_id, origin)) = decision.blocklist_add {
        upsert_blocklist(tx, envelope.run_id.to_string().as_str(), family_id, origin)?;
    }

    // Recorded independent of which side won the finalization race: the
    // soul-link-creation trigger counts every player who caught on a route,
    // not only the one whose route_progress row ended up finalized.
    if payload.outcome == soullink_core::enums::EncounterOutcome::Caught {
        tx.execute(
            "INSERT OR IGNORE INTO route_catches (run_id, route_id, player_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                envelope.run_id.to_string(),
                route_id.get(),
                envelope.player_id.to_string(),
                now_rfc3339(),
            ],
        )?;
    }

    Ok(finalize_outcome)
}

fn handle_faint(
    tx: &Transaction<'_>,
    envelope: &EventEnvelope,
    payload: &FaintPayload,
) -> Result<ProjectionOutcome, StoreError> {
    let _ = rules::process_faint();
    tx.execute(
        "INSERT INTO party_status (run_id, player_id, pokemon_key, alive, last_update)
         VALUES (?1, ?2, ?3, 0, ?4)
         ON CONFLICT(run_id, player_id, pokemon_key) DO UPDATE SET
            alive = 0, last_update = excluded.last_update",
        params![
            envelope.run_id.to_string(),
            envelope.player_id.to_string(),
            payload.pokemon_key,
            now_rfc3339(),
        ],
    )?;
    let _ = payload.party_slot_index;
    Ok(ProjectionOutcome::Applied)
}

fn handle_family_blocked(
    tx: &Transaction<'_>,
    run_id: &str,
    payload: &FamilyBlockedPayload,
) -> Result<ProjectionOutcome, StoreError> {
    upsert_blocklist(tx, run_id, payload.family_id, payload.origin)
}

fn handle_soul_link_created(
    tx: &Transaction<'_>,
    run_id: &str,
    payload: &SoulLinkCreatedPayload,
) -> Result<ProjectionOutcome, StoreError> {
    tx.execute(
        "INSERT OR IGNORE INTO links (id, run_id, route_id) VALUES (?1, ?2, ?3)",
        params![payload.link_id.to_string(), run_id, payload.route_id.get()],
    )?;
    for player_id in &payload.participating_players {
        tx.execute(
            "INSERT OR IGNORE INTO link_members (link_id, player_id) VALUES (?1, ?2)",
            params![payload.link_id.to_string(), player_id.to_string()],
        )?;
    }
    Ok(ProjectionOutcome::Applied)
}

fn handle_soul_link_broken(
    tx: &Transaction<'_>,
    payload: &SoulLinkBrokenPayload,
) -> Result<ProjectionOutcome, StoreError> {
    // Deliberately no faint cascade: any resulting fainting arrives as
    // separately emitted `Faint` events (decided Open Question).
    tx.execute(
        "DELETE FROM link_members WHERE link_id = ?1",
        params![payload.link_id.to_string()],
    )?;
    tx.execute(
        "DELETE FROM links WHERE id = ?1",
        params![payload.link_id.to_string()],
    )?;
    let _ = &payload.affected_players;
    Ok(ProjectionOutcome::Applied)
}

fn handle_first_encounter_finalized(
    tx: &Transaction<'_>,
    run_id: &str,
    payload: &FirstEncounterFinalizedPayload,
) -> Result<ProjectionOutcome, StoreError> {
    // Synthesized immediately after the `CatchResult` that won the race;
    // the actual write already happened in `finalize_route_progress`.
    // Re-applying here (e.g. during rebuild replay) is a harmless upsert.
    finalize_route_progress(tx, run_id, payload.finalizing_player, payload.route_id)
}

// ============================================================================
// SECTION: Savepoint-isolated writes
// ============================================================================

fn finalize_route_progress(
    tx: &Transaction<'_>,
    run_id: &str,
    player_id: PlayerId,
    route_id: RouteId,
) -> Result<ProjectionOutcome, StoreError> {
    let savepoint = tx.savepoint()?;
    let result = savepoint.execute(
        "INSERT INTO route_progress (run_id, player_id, route_id, finalized, last_update)
         VALUES (?1, ?2, ?3, 1, ?4)
         ON CONFLICT(run_id, player_id, route_id) DO UPDATE SET
            finalized = 1, last_update = excluded.last_update",
        params![run_id, player_id.to_string(), route_id.get(), now_rfc3339()],
    );

    match result {
        Ok(_) => {
            savepoint.commit()?;
            Ok(ProjectionOutcome::Applied)
        }
        Err(err) if is_unique_violation(&err, "route_progress") => {
            drop(savepoint);
            Ok(ProjectionOutcome::ExpectedConflict(
                ConflictReason::RouteAlreadyFinalized,
            ))
        }
        Err(other) => Err(other.into()),
    }
}

fn upsert_blocklist(
    tx: &Transaction<'_>,
    run_id: &str,
    family_id: FamilyId,
    origin: BlockOrigin,
) -> Result<ProjectionOutcome, StoreError> {
    let savepoint = tx.savepoint()?;
    let origin_label = origin_label(origin);
    let result = savepoint.execute(
        "INSERT INTO blocklist (run_id, family_id, origin, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![run_id, family_id.get(), origin_label, now_rfc3339()],
    );

    match result {
        Ok(_) => {
            savepoint.commit()?;
            Ok(ProjectionOutcome::Applied)
        }
        Err(err) if is_unique_violation(&err, "blocklist") => {
            let existing_label: String = savepoint.query_row(
                "SELECT origin FROM blocklist WHERE run_id = ?1 AND family_id = ?2",
                params![run_id, family_id.get()],
                |row| row.get(0),
            )?;
            let existing = parse_origin(&existing_label);
            if origin.priority() > existing.priority() {
                savepoint.execute(
                    "UPDATE blocklist SET origin = ?1 WHERE run_id = ?2 AND family_id = ?3",
                    params![origin_label, run_id, family_id.get()],
                )?;
            }
            savepoint.commit()?;
            Ok(ProjectionOutcome::ExpectedConflict(
                ConflictReason::FamilyAlreadyBlocked,
            ))
        }
        Err(other) => Err(other.into()),
    }
}

// ============================================================================
// SECTION: Read helpers
// ============================================================================

fn is_family_blocked(
    tx: &Transaction<'_>,
    run_id: &str,
    family_id: FamilyId,
) -> Result<bool, StoreError> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM blocklist WHERE run_id = ?1 AND family_id = ?2",
        params![run_id, family_id.get()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn route_already_finalized_by_other_player(
    tx: &Transaction<'_>,
    run_id: &str,
    player_id: PlayerId,
    route_id: RouteId,
    family_id: FamilyId,
) -> Result<bool, StoreError> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM route_progress
         WHERE run_id = ?1 AND route_id = ?2 AND finalized = 1
           AND first_encounter_family_id = ?3 AND player_id != ?4",
        params![run_id, route_id.get(), family_id.get(), player_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn resolve_encounter(
    tx: &Transaction<'_>,
    run_id: &str,
    encounter_id: EventId,
) -> Option<(PlayerId, RouteId, FamilyId)> {
    tx.query_row(
        "SELECT player_id, route_id, family_id FROM encounter_index
         WHERE run_id = ?1 AND encounter_id = ?2",
        params![run_id, encounter_id.to_string()],
        |row| {
            let player_id: String = row.get(0)?;
            let route_id: i64 = row.get(1)?;
            let family_id: i64 = row.get(2)?;
            Ok((player_id, route_id, family_id))
        },
    )
    .ok()
    .and_then(|(player_id, route_id, family_id)| {
        player_id
            .parse::<uuid::Uuid>()
            .ok()
            .map(|uuid| (PlayerId::from(uuid), RouteId::new(route_id), FamilyId::new(family_id)))
    })
}

// ============================================================================
// SECTION: Small utilities
// ============================================================================

fn is_unique_violation(err: &rusqlite::Error, table_hint: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(sqlite_err, message) => {
            sqlite_err.code == ErrorCode::ConstraintViolation
                && message
                    .as_deref()
                    .is_some_and(|text| text.contains(table_hint))
        }
        _ => false,
    }
}

fn origin_label(origin: BlockOrigin) -> &'static str {
    match origin {
        BlockOrigin::Faint => "faint",
        BlockOrigin::FirstEncounter => "first_encounter",
        BlockOrigin::Caught => "caught",
    }
}

fn parse_origin(label: &str) -> BlockOrigin {
    match label {
        "faint" => BlockOrigin::Faint,
        "first_encounter" => BlockOrigin::FirstEncounter,
        _ => BlockOrigin::Caught,
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use soullink_core::identifiers::PlayerId;
    use soullink_core::identifiers::RunId;
    use soullink_core::identifiers::SpeciesId;

    fn seed_run_and_player(connection: &rusqlite::Connection, run_id: RunId, player_id: PlayerId) {
        connection
            .execute(
                "INSERT INTO runs (id, display_name, rules_json, created_at) VALUES (?1, 'r', '{}', '')",
                params![run_id.to_string()],
            )
            .expect("seed run");
        connection
            .execute(
                "INSERT INTO players (id, run_id, display_name, game_label, region_label, token_hash, created_at)
                 VALUES (?1, ?2, 'p', 'g', 'r', 'h', '')",
                params![player_id.to_string(), run_id.to_string()],
            )
            .expect("seed player");
    }

    #[test]
    fn second_player_finalizing_same_route_is_expected_conflict() {
        let mut connection = crate::connection::open_in_memory().expect("open");
        let run_id = RunId::generate();
        let alice = PlayerId::generate();
        let bob = PlayerId::generate();
        seed_run_and_player(&connection, run_id, alice);
        let tx = connection.transaction().expect("tx");
        connection_seed_player(&tx, run_id, bob);

        let route_id = RouteId::new(31);
        let first = finalize_route_progress(&tx, &run_id.to_string(), alice, route_id).expect("first");
        assert_eq!(first, ProjectionOutcome::Applied);

        let second = finalize_route_progress(&tx, &run_id.to_string(), bob, route_id).expect("second");
        assert_eq!(
            second,
            ProjectionOutcome::ExpectedConflict(ConflictReason::RouteAlreadyFinalized)
        );
        tx.commit().expect("commit");
    }

    fn connection_seed_player(tx: &Transaction<'_>, run_id: RunId, player_id: PlayerId) {
        tx.execute(
            "INSERT INTO players (id, run_id, display_name, game_label, region_label, token_hash, created_at)
             VALUES (?1, ?2, 'p2', 'g', 'r', 'h', '')",
            params![player_id.to_string(), run_id.to_string()],
        )
        .expect("seed second player");
    }

    #[test]
    fn blocklist_upgrades_origin_on_higher_priority_conflict() {
        let connection = crate::connection::open_in_memory().expect("open");
        let run_id = RunId::generate();
        let player_id = PlayerId::generate();
        seed_run_and_player(&connection, run_id, player_id);
        let tx = connection.unchecked_transaction().expect("tx");

        let family_id = FamilyId::new(1);
        let first = upsert_blocklist(&tx, &run_id.to_string(), family_id, BlockOrigin::Faint).expect("first");
        assert_eq!(first, ProjectionOutcome::Applied);

        let second =
            upsert_blocklist(&tx, &run_id.to_string(), family_id, BlockOrigin::Caught).expect("second");
        assert_eq!(
            second,
            ProjectionOutcome::ExpectedConflict(ConflictReason::FamilyAlreadyBlocked)
        );

        let origin: String = tx
            .query_row(
                "SELECT origin FROM blocklist WHERE run_id = ?1 AND family_id = ?2",
                params![run_id.to_string(), family_id.get()],
                |row| row.get(0),
            )
            .expect("read back");
        assert_eq!(origin, "caught");
        let _ = SpeciesId::new(1);
    }

    #[test]
    fn dupe_skip_crosses_players_once_a_family_is_finalized_on_a_route() {
        use soullink_core::enums::EncounterMethod;
        use soullink_core::enums::EncounterOutcome;
        use soullink_core::events::CatchResultPayload;
        use soullink_core::events::EncounterPayload;
        use time::OffsetDateTime;

        let mut connection = crate::connection::open_in_memory().expect("open");
        let run_id = RunId::generate();
        let alice = PlayerId::generate();
        let bob = PlayerId::generate();
        seed_run_and_player(&connection, run_id, alice);
        let route_id = RouteId::new(31);
        let family_id = FamilyId::new(25);

        let tx = connection.transaction().expect("tx");
        connection_seed_player(&tx, run_id, bob);

        let encounter_a = EventEnvelope {
            event_id: EventId::generate(),
            run_id,
            player_id: alice,
            occurred_at: OffsetDateTime::UNIX_EPOCH,
            stored_at: OffsetDateTime::UNIX_EPOCH,
            sequence_number: 1,
            payload: EventPayload::Encounter(EncounterPayload {
                route_id,
                species_id: SpeciesId::new(25),
                family_id,
                level: 5,
                shiny: false,
                method: EncounterMethod::Grass,
                rod_kind: None,
                status: soullink_core::enums::EncounterStatus::FirstEncounter,
                dupes_skip: false,
                fe_finalized: false,
            }),
        };
        apply_event(&tx, &encounter_a).expect("apply encounter a");

        let catch_a = EventEnvelope {
            event_id: EventId::generate(),
            run_id,
            player_id: alice,
            occurred_at: OffsetDateTime::UNIX_EPOCH,
            stored_at: OffsetDateTime::UNIX_EPOCH,
            sequence_number: 2,
            payload: EventPayload::CatchResult(CatchResultPayload {
                encounter_id: encounter_a.event_id,
                outcome: EncounterOutcome::Caught,
            }),
        };
        apply_event(&tx, &catch_a).expect("apply catch a");

        let encounter_b = EventEnvelope {
            event_id: EventId::generate(),
            run_id,
            player_id: bob,
            occurred_at: OffsetDateTime::UNIX_EPOCH,
            stored_at: OffsetDateTime::UNIX_EPOCH,
            sequence_number: 3,
            payload: EventPayload::Encounter(EncounterPayload {
                route_id,
                species_id: SpeciesId::new(26),
                family_id,
                level: 6,
                shiny: false,
                method: EncounterMethod::Grass,
                rod_kind: None,
                status: soullink_core::enums::EncounterStatus::FirstEncounter,
                dupes_skip: false,
                fe_finalized: false,
            }),
        };
        apply_event(&tx, &encounter_b).expect("apply encounter b");

        let bob_route_progress: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM route_progress WHERE run_id = ?1 AND player_id = ?2 AND route_id = ?3",
                params![run_id.to_string(), bob.to_string(), route_id.get()],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(bob_route_progress, 0, "dupe-skipped encounter must not create a route_progress row");

        let blocked_origin: String = tx
            .query_row(
                "SELECT origin FROM blocklist WHERE run_id = ?1 AND family_id = ?2",
                params![run_id.to_string(), family_id.get()],
                |row| row.get(0),
            )
            .expect("blocklist row");
        assert_eq!(blocked_origin, "caught");

        tx.commit().expect("commit");
    }
}
