// crates/soullink-store-sqlite/src/registry.rs
// ============================================================================
// Module: SoulLink Run & Player Registry
// Description: CRUD for runs and players, and bearer-token verification.
// Purpose: Back the run/player registry with durable storage,
//          including the one-time token issuance and rotation used by the
//          admin surface.
// Dependencies: rusqlite, soullink-core, subtle
// ============================================================================

//! ## Overview
//! Player tokens are never stored in plaintext: only a SHA-256 hash of the
//! token is persisted, and [`verify_player_token`] compares hashes in
//! constant time via `subtle` to avoid leaking timing information about a
//! partial match.

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use soullink_core::hashing;
use soullink_core::identifiers::PlayerId;
use soullink_core::identifiers::RunId;
use soullink_core::registry::Player;
use soullink_core::registry::RulesConfig;
use soullink_core::registry::Run;

use crate::error::StoreError;

/// Creates a new run with the given rules configuration.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure.
pub fn create_run(
    connection: &Connection,
    display_name: &str,
    rules: RulesConfig,
) -> Result<Run, StoreError> {
    let run_id = RunId::generate();
    let rules_json = serde_json::to_string(&rules).unwrap_or_else(|_| "{}".to_string());
    connection.execute(
        "INSERT INTO runs (id, display_name, rules_json, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![run_id.to_string(), display_name, rules_json, now_rfc3339()],
    )?;
    Ok(Run {
        id: run_id,
        display_name: display_name.to_string(),
        rules,
    })
}

/// Looks up a run by id.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure.
pub fn get_run(connection: &Connection, run_id: RunId) -> Result<Option<Run>, StoreError> {
    connection
        .query_row(
            "SELECT display_name, rules_json FROM runs WHERE id = ?1",
            params![run_id.to_string()],
            |row| {
                let display_name: String = row.get(0)?;
                let rules_json: String = row.get(1)?;
                Ok((display_name, rules_json))
            },
        )
        .optional()?
        .map(|(display_name, rules_json)| {
            let rules: RulesConfig = serde_json::from_str(&rules_json).unwrap_or_default();
            Ok(Run {
                id: run_id,
                display_name,
                rules,
            })
        })
        .transpose()
}

/// Creates a player within a run and returns both the player record and the
/// one-time plaintext bearer token. The token is never stored or
/// retrievable again; only its hash is persisted.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure, including a
/// uniqueness violation if `display_name` is already taken within the run.
pub fn create_player(
    connection: &Connection,
    run_id: RunId,
    display_name: &str,
    game_label: &str,
    region_label: &str,
) -> Result<(Player, String), StoreError> {
    let player_id = PlayerId::generate();
    let token = Uuid::new_v4().to_string();
    let token_hash = hashing::hash_bytes(token.as_bytes());

    connection.execute(
        "INSERT INTO players (id, run_id, display_name, game_label, region_label, token_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            player_id.to_string(),
            run_id.to_string(),
            display_name,
            game_label,
            region_label,
            token_hash,
            now_rfc3339(),
        ],
    )?;

    Ok((
        Player {
            id: player_id,
            run_id,
            display_name: display_name.to_string(),
            game_label: game_label.to_string(),
            region_label: region_label.to_string(),
            token_hash,
        },
        token,
    ))
}

/// Issues a new bearer token for an existing player, invalidating the
/// previous one.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure.
pub fn rotate_player_token(
    connection: &Connection,
    run_id: RunId,
    player_id: PlayerId,
) -> Result<String, StoreError> {
    let token = Uuid::new_v4().to_string();
    let token_hash = hashing::hash_bytes(token.as_bytes());
    let updated = connection.execute(
        "UPDATE players SET token_hash = ?1 WHERE id = ?2 AND run_id = ?3",
        params![token_hash, player_id.to_string(), run_id.to_string()],
    )?;
    if updated == 0 {
        return Err(StoreError::PlayerNotFound { run_id, player_id });
    }
    Ok(token)
}

/// Looks up a player by id within a run.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure.
pub fn get_player(
    connection: &Connection,
    run_id: RunId,
    player_id: PlayerId,
) -> Result<Option<Player>, StoreError> {
    connection
        .query_row(
            "SELECT display_name, game_label, region_label, token_hash
             FROM players WHERE id = ?1 AND run_id = ?2",
            params![player_id.to_string(), run_id.to_string()],
            |row| {
                Ok(Player {
                    id: player_id,
                    run_id,
                    display_name: row.get(0)?,
                    game_label: row.get(1)?,
                    region_label: row.get(2)?,
                    token_hash: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
}

/// Verifies a bearer token against a player's stored hash in constant time.
///
/// # Errors
///
/// Returns [`StoreError::Sqlite`] on a database failure.
pub fn verify_player_token(
    connection: &Connection,
    run_id: RunId,
    player_id: PlayerId,
    presented_token: &str,
) -> Result<bool, StoreError> {
    let Some(player) = get_player(connection, run_id, player_id)? else {
        return Ok(false);
    };
    let presented_hash = hashing::hash_bytes(presented_token.as_bytes());
    Ok(presented_hash.as_bytes().ct_eq(player.token_hash.as_bytes()).into())
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_player_token_verifies_and_rotation_invalidates_old_token() {
        let connection = crate::connection::open_in_memory().expect("open");
        let run = create_run(&connection, "Run", RulesConfig::default()).expect("create run");
        let (player, token) =
            create_player(&connection, run.id, "Ash", "HeartGold", "Johto").expect("create player");

        assert!(verify_player_token(&connection, run.id, player.id, &token).expect("verify"));
        assert!(!verify_player_token(&connection, run.id, player.id, "wrong").expect("verify"));

        let new_token = rotate_player_token(&connection, run.id, player.id).expect("rotate");
        assert!(!verify_player_token(&connection, run.id, player.id, &token).expect("verify"));
        assert!(verify_player_token(&connection, run.id, player.id, &new_token).expect("verify"));
    }

    #[test]
    fn duplicate_display_name_in_run_is_rejected() {
        let connection = crate::connection::open_in_memory().expect("open");
        let run = create_run(&connection, "Run", RulesConfig::default()).expect("create run");
        create_player(&connection, run.id, "Ash", "HeartGold", "Johto").expect("first");
        let result = create_player(&connection, run.id, "ash", "Crystal", "Johto");
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }
}
