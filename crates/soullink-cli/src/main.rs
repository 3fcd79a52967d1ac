// crates/soullink-cli/src/main.rs
// ============================================================================
// Module: SoulLink CLI Entry Point
// Description: Command dispatcher for serving the tracker and administering
//              runs, players, and projections from the command line.
// Purpose: Give an operator one binary to boot the service and perform the
//          localhost-only admin operations without a separate HTTP client.
// Dependencies: clap, serde_json, soullink-config, soullink-service,
//               soullink-store-sqlite, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! Two command groups: `serve` boots the HTTP/WebSocket service in the
//! foreground, and `admin` wraps the same store operations the service's
//! localhost-only admin endpoints expose, for use against a database file
//! directly (no running server required). Every admin subcommand opens its
//! own short-lived connection, matching how a one-shot CLI invocation is
//! expected to behave rather than holding a long-lived lock like the
//! service's `AppState` does.

use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use thiserror::Error;

use soullink_config::ConfigError;
use soullink_config::SoullinkConfig;
use soullink_core::identifiers::PlayerId;
use soullink_core::identifiers::RunId;
use soullink_core::registry::RulesConfig;
use soullink_service::ServeError;
use soullink_store_sqlite::StoreError;
use soullink_store_sqlite::admin;
use soullink_store_sqlite::registry;

/// Top-level command-line interface for the SoulLink tracker.
#[derive(Parser, Debug)]
#[command(name = "soullink", disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the ingestion/catch-up/live-stream HTTP service.
    Serve(ServeArgs),
    /// Run registry and projection administration utilities.
    Admin {
        /// Selected admin subcommand.
        #[command(subcommand)]
        command: AdminCommand,
    },
}

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
struct ServeArgs {
    /// Optional config file path (defaults to `soullink.toml` or
    /// `SOULLINK_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Subcommands under `admin`.
#[derive(Subcommand, Debug)]
enum AdminCommand {
    /// Create a new run.
    CreateRun(CreateRunArgs),
    /// Create a player within a run and print its one-time bearer token.
    CreatePlayer(CreatePlayerArgs),
    /// Rotate a player's bearer token.
    RotateToken(RunPlayerArgs),
    /// Rebuild projections for a run from its event log.
    Rebuild(RunArgs),
    /// Print event-store statistics for a run.
    Stats(RunArgs),
}

/// Arguments shared by every admin subcommand: the database to operate on.
#[derive(Args, Debug)]
struct DbArgs {
    /// Optional config file path (defaults to `soullink.toml` or
    /// `SOULLINK_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `admin create-run`.
#[derive(Args, Debug)]
struct CreateRunArgs {
    /// Database selection, shared with every admin subcommand.
    #[command(flatten)]
    db: DbArgs,
    /// Display name for the new run.
    #[arg(long)]
    display_name: String,
    /// Disable the dupes-clause rule for this run.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_dupes_clause: bool,
    /// Disable the soul-link rule for this run.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_soul_link: bool,
}

/// Arguments for `admin create-player`.
#[derive(Args, Debug)]
struct CreatePlayerArgs {
    /// Database selection, shared with every admin subcommand.
    #[command(flatten)]
    db: DbArgs,
    /// Run the player belongs to.
    #[arg(long)]
    run_id: String,
    /// Display name, unique within the run (case-insensitive).
    #[arg(long)]
    display_name: String,
    /// Game version label (e.g. `HeartGold`).
    #[arg(long)]
    game_label: String,
    /// Region label (e.g. `Johto`).
    #[arg(long)]
    region_label: String,
}

/// Arguments identifying a single run and player.
#[derive(Args, Debug)]
struct RunPlayerArgs {
    /// Database selection, shared with every admin subcommand.
    #[command(flatten)]
    db: DbArgs,
    /// Target run.
    #[arg(long)]
    run_id: String,
    /// Target player.
    #[arg(long)]
    player_id: String,
}

/// Arguments identifying a single run.
#[derive(Args, Debug)]
struct RunArgs {
    /// Database selection, shared with every admin subcommand.
    #[command(flatten)]
    db: DbArgs,
    /// Target run.
    #[arg(long)]
    run_id: String,
}

/// Errors raised while parsing CLI input or dispatching a command.
#[derive(Debug, Error)]
enum CliError {
    /// A `--run-id`/`--player-id` argument was not a valid UUID.
    #[error("invalid identifier {value:?}: {reason}")]
    InvalidId {
        /// The offending raw argument value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The `serve` command's accept loop failed.
    #[error(transparent)]
    Serve(#[from] ServeError),
    /// Writing output to stdout or stderr failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// Result alias used throughout command dispatch.
type CliResult<T> = Result<T, CliError>;

/// Parses a run identifier from a CLI argument.
///
/// # Errors
///
/// Returns [`CliError::InvalidId`] if `value` is not a valid UUID.
fn parse_run_id(value: &str) -> CliResult<RunId> {
    value
        .parse::<uuid::Uuid>()
        .map(RunId::from)
        .map_err(|err| CliError::InvalidId {
            value: value.to_string(),
            reason: err.to_string(),
        })
}

/// Parses a player identifier from a CLI argument.
///
/// # Errors
///
/// Returns [`CliError::InvalidId`] if `value` is not a valid UUID.
fn parse_player_id(value: &str) -> CliResult<PlayerId> {
    value
        .parse::<uuid::Uuid>()
        .map(PlayerId::from)
        .map_err(|err| CliError::InvalidId {
            value: value.to_string(),
            reason: err.to_string(),
        })
}

/// Loads configuration from an explicit path, or the default search path if
/// none was given.
///
/// # Errors
///
/// Returns [`CliError::Config`] if the file cannot be read, parsed, or
/// fails validation.
fn load_config(path: Option<&Path>) -> CliResult<SoullinkConfig> {
    match path {
        Some(path) => SoullinkConfig::from_file(path).map_err(CliError::from),
        None => SoullinkConfig::load().map_err(CliError::from),
    }
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(stderr, "{message}")
}

/// Serializes `value` as pretty-printed JSON and writes it to stdout.
///
/// # Errors
///
/// Returns [`CliError::Output`] if the write fails.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
    write_stdout_line(&rendered).map_err(CliError::from)
}

/// CLI entry point returning a process exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = write_stderr_line(&err.to_string());
            ExitCode::FAILURE
        }
    }
}

/// Parses arguments and dispatches to the selected command.
///
/// # Errors
///
/// Returns whatever [`CliError`] the selected command produces.
async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => command_serve(args).await,
        Commands::Admin { command } => command_admin(command),
    }
}

/// Executes the `serve` command.
async fn command_serve(args: ServeArgs) -> CliResult<()> {
    let config = load_config(args.config.as_deref())?;
    soullink_service::serve(config).await.map_err(CliError::from)
}

/// Dispatches to the selected `admin` subcommand.
fn command_admin(command: AdminCommand) -> CliResult<()> {
    match command {
        AdminCommand::CreateRun(args) => command_create_run(args),
        AdminCommand::CreatePlayer(args) => command_create_player(args),
        AdminCommand::RotateToken(args) => command_rotate_token(args),
        AdminCommand::Rebuild(args) => command_rebuild(args),
        AdminCommand::Stats(args) => command_stats(args),
    }
}

/// Executes `admin create-run`.
fn command_create_run(args: CreateRunArgs) -> CliResult<()> {
    let config = load_config(args.db.config.as_deref())?;
    let connection = soullink_store_sqlite::open(&config.database_path, config.busy_timeout())?;
    let rules = RulesConfig {
        dupes_clause: !args.no_dupes_clause,
        soul_link: !args.no_soul_link,
    };
    let run = registry::create_run(&connection, &args.display_name, rules)?;
    write_json(&run)
}

/// Executes `admin create-player`.
fn command_create_player(args: CreatePlayerArgs) -> CliResult<()> {
    let config = load_config(args.db.config.as_deref())?;
    let run_id = parse_run_id(&args.run_id)?;
    let connection = soullink_store_sqlite::open(&config.database_path, config.busy_timeout())?;
    let (player, token) = registry::create_player(
        &connection,
        run_id,
        &args.display_name,
        &args.game_label,
        &args.region_label,
    )?;
    write_json(&serde_json::json!({
        "player_id": player.id,
        "token": token,
    }))
}

/// Executes `admin rotate-token`.
fn command_rotate_token(args: RunPlayerArgs) -> CliResult<()> {
    let config = load_config(args.db.config.as_deref())?;
    let run_id = parse_run_id(&args.run_id)?;
    let player_id = parse_player_id(&args.player_id)?;
    let connection = soullink_store_sqlite::open(&config.database_path, config.busy_timeout())?;
    let token = registry::rotate_player_token(&connection, run_id, player_id)?;
    write_json(&serde_json::json!({ "token": token }))
}

/// Executes `admin rebuild`.
fn command_rebuild(args: RunArgs) -> CliResult<()> {
    let config = load_config(args.db.config.as_deref())?;
    let run_id = parse_run_id(&args.run_id)?;
    let mut connection = soullink_store_sqlite::open(&config.database_path, config.busy_timeout())?;
    admin::rebuild_all(&mut connection, run_id)?;
    write_stdout_line("rebuild complete").map_err(CliError::from)
}

/// Executes `admin stats`.
fn command_stats(args: RunArgs) -> CliResult<()> {
    let config = load_config(args.db.config.as_deref())?;
    let run_id = parse_run_id(&args.run_id)?;
    let connection = soullink_store_sqlite::open(&config.database_path, config.busy_timeout())?;
    let stats = admin::event_store_stats(&connection, run_id)?;
    write_json(&serde_json::json!({
        "event_count": stats.event_count,
        "latest_sequence": stats.latest_sequence,
    }))
}
