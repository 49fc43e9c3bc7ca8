//! Matplan CLI - plan jiu-jitsu training games and class sessions
//!
//! Works against the local offline store; `matplan sync` drains queued
//! changes to the remote data service when one is configured.

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use matplan_core::services::StoreService;
use matplan_core::sync::{DrainOutcome, HttpDataService, RemoteError, SyncEngine};
use matplan_core::{Collection, Game, GameId, Session, SessionId};
use serde::Serialize;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "matplan")]
#[command(about = "Plan jiu-jitsu training games and class sessions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH", global = true)]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a training game to the catalog
    AddGame {
        /// Game name
        name: String,
        /// Topic the game trains, e.g. "guard passing"
        #[arg(short, long)]
        topic: String,
        /// Playable from the top position
        #[arg(long)]
        top: bool,
        /// Playable from the bottom position
        #[arg(long)]
        bottom: bool,
    },
    /// List games in the catalog
    ListGames {
        /// Filter by topic
        #[arg(long)]
        topic: Option<String>,
        /// Only favorites
        #[arg(long)]
        favorites: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a game as a favorite (or unmark with --unset)
    Favorite {
        /// Game ID or unique ID prefix
        id: String,
        /// Remove the favorite mark instead
        #[arg(long)]
        unset: bool,
    },
    /// Delete a game from the catalog
    DeleteGame {
        /// Game ID or unique ID prefix
        id: String,
    },
    /// Plan a class session
    AddSession {
        /// Session title
        title: String,
        /// Scheduled time: RFC 3339, "YYYY-MM-DD HH:MM", or "YYYY-MM-DD"
        #[arg(short, long)]
        date: String,
        /// Game to include, by ID or unique prefix (repeatable, in teaching order)
        #[arg(short, long = "game", value_name = "GAME_ID")]
        games: Vec<String>,
        /// Coach notes
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// List planned sessions
    ListSessions {
        /// Only sessions scheduled from now on
        #[arg(long)]
        upcoming: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a planned session
    DeleteSession {
        /// Session ID or unique ID prefix
        id: String,
    },
    /// Drain queued changes to the remote service
    Sync {
        /// Also pull the latest remote records into the local cache
        #[arg(long)]
        pull: bool,
    },
    /// Show sync queue and last-sync state
    Status,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] matplan_core::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Game not found for id/prefix: {0}")]
    GameNotFound(String),
    #[error("Session not found for id/prefix: {0}")]
    SessionNotFound(String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Could not parse date '{0}'; use RFC 3339, \"YYYY-MM-DD HH:MM\", or \"YYYY-MM-DD\"")]
    InvalidDate(String),
    #[error("Sync is not configured. Set MATPLAN_REMOTE_URL to enable `matplan sync`.")]
    SyncNotConfigured,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("matplan=info".parse().unwrap()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    tracing::debug!(path = %db_path.display(), "using local database");

    match cli.command {
        Commands::AddGame {
            name,
            topic,
            top,
            bottom,
        } => run_add_game(&name, &topic, top, bottom, &db_path).await?,
        Commands::ListGames {
            topic,
            favorites,
            json,
        } => run_list_games(topic.as_deref(), favorites, json, &db_path).await?,
        Commands::Favorite { id, unset } => run_favorite(&id, unset, &db_path).await?,
        Commands::DeleteGame { id } => run_delete_game(&id, &db_path).await?,
        Commands::AddSession {
            title,
            date,
            games,
            notes,
        } => run_add_session(&title, &date, &games, &notes, &db_path).await?,
        Commands::ListSessions { upcoming, json } => {
            run_list_sessions(upcoming, json, &db_path).await?;
        }
        Commands::DeleteSession { id } => run_delete_session(&id, &db_path).await?,
        Commands::Sync { pull } => run_sync(pull, &db_path).await?,
        Commands::Status => run_status(&db_path).await?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}

async fn run_add_game(
    name: &str,
    topic: &str,
    top: bool,
    bottom: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = StoreService::open_path(db_path).await?;

    let mut game = Game::new(name, topic);
    game.top = top;
    game.bottom = bottom;
    let game = store.create_game(game).await?;

    println!("{}", game.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct GameListItem {
    id: String,
    name: String,
    topic: String,
    top: bool,
    bottom: bool,
    favorite: bool,
    pending: bool,
    updated_at: i64,
    relative_time: String,
}

async fn run_list_games(
    topic: Option<&str>,
    favorites: bool,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = StoreService::open_path(db_path).await?;
    let games = if favorites {
        store.list_favorite_games().await?
    } else if let Some(topic) = topic {
        store.list_games_by_topic(topic).await?
    } else {
        store.list_games().await?
    };

    if as_json {
        let items = games.iter().map(game_to_list_item).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_game_lines(&games) {
            println!("{line}");
        }
    }

    Ok(())
}

async fn run_favorite(id: &str, unset: bool, db_path: &Path) -> Result<(), CliError> {
    let store = StoreService::open_path(db_path).await?;
    let mut game = resolve_game(&store, id).await?;

    game.favorite = !unset;
    let game = store.update_game(game).await?;
    println!("{}", game.id);
    Ok(())
}

async fn run_delete_game(id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = StoreService::open_path(db_path).await?;
    let game = resolve_game(&store, id).await?;

    store.delete_game(&game.id).await?;
    println!("{}", game.id);
    Ok(())
}

async fn run_add_session(
    title: &str,
    date: &str,
    game_queries: &[String],
    notes: &str,
    db_path: &Path,
) -> Result<(), CliError> {
    let scheduled_for = parse_when(date)?;
    let store = StoreService::open_path(db_path).await?;

    let mut session = Session::new(title, scheduled_for);
    session.notes = notes.to_string();
    for query in game_queries {
        let game = resolve_game(&store, query).await?;
        session.game_ids.push(game.id);
    }

    let session = store.create_session(session).await?;
    println!("{}", session.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct SessionListItem {
    id: String,
    title: String,
    scheduled_for: i64,
    scheduled_for_iso: String,
    games: usize,
    notes: String,
    pending: bool,
}

async fn run_list_sessions(upcoming: bool, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = StoreService::open_path(db_path).await?;
    let sessions = if upcoming {
        store
            .list_upcoming_sessions(Utc::now().timestamp_millis())
            .await?
    } else {
        store.list_sessions().await?
    };

    if as_json {
        let items = sessions.iter().map(session_to_list_item).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for session in &sessions {
            let short_id = short(&session.id.as_str());
            let when = format_timestamp(session.scheduled_for);
            let marker = if session.pending { "  (unsynced)" } else { "" };
            println!(
                "{short_id:<8}  {when}  {:<32}  {} games{marker}",
                session.title,
                session.game_ids.len()
            );
        }
    }

    Ok(())
}

async fn run_delete_session(id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = StoreService::open_path(db_path).await?;
    let session = resolve_session(&store, id).await?;

    store.delete_session(&session.id).await?;
    println!("{}", session.id);
    Ok(())
}

async fn run_sync(pull: bool, db_path: &Path) -> Result<(), CliError> {
    let endpoint = env::var("MATPLAN_REMOTE_URL").map_err(|_| CliError::SyncNotConfigured)?;
    let remote = HttpDataService::new(endpoint)?;

    let store = StoreService::open_path(db_path).await?;
    let engine = SyncEngine::new(store, remote);

    if let Some(report) = engine.trigger().await? {
        println!(
            "Applied {} change(s), {} still queued",
            report.applied, report.remaining
        );
        for issue in &report.dropped {
            eprintln!(
                "Dropped {} {} ({}): {}",
                issue.collection, issue.record_key, issue.kind, issue.message
            );
        }
        if report.outcome == DrainOutcome::Interrupted {
            println!("Remote unreachable; remaining changes will sync later");
            return Ok(());
        }
    }

    if pull {
        let games = engine.refresh(Collection::Games).await?;
        let sessions = engine.refresh(Collection::Sessions).await?;
        println!("Pulled {games} game(s) and {sessions} session(s)");
    }

    Ok(())
}

async fn run_status(db_path: &Path) -> Result<(), CliError> {
    let store = StoreService::open_path(db_path).await?;

    let pending = store.pending_mutations().await?;
    if pending.is_empty() {
        println!("Queue empty");
    } else {
        println!("{} queued change(s):", pending.len());
        for entry in &pending {
            println!(
                "  #{:<5} {:<7} {:<9} {}",
                entry.seq,
                entry.kind.as_str(),
                entry.collection,
                short(&entry.record_key)
            );
        }
    }

    for collection in [Collection::Games, Collection::Sessions] {
        match store.last_sync(collection).await? {
            Some(ts) => println!("Last sync ({collection}): {}", format_timestamp(ts)),
            None => println!("Last sync ({collection}): never"),
        }
    }

    Ok(())
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "matplan", buffer);
}

/// Resolve a game by full ID or unique ID prefix.
async fn resolve_game(store: &StoreService, query: &str) -> Result<Game, CliError> {
    let query = query.trim();
    if let Ok(id) = query.parse::<GameId>() {
        if let Some(game) = store.get_game(&id).await? {
            return Ok(game);
        }
    }

    let games = store.list_games().await?;
    let mut matches = games
        .into_iter()
        .filter(|game| game.id.as_str().starts_with(query))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(CliError::GameNotFound(query.to_string())),
        1 => Ok(matches.remove(0)),
        _ => Err(CliError::AmbiguousId(ambiguous_message(
            query,
            matches.iter().map(|game| game.id.as_str()),
        ))),
    }
}

/// Resolve a session by full ID or unique ID prefix.
async fn resolve_session(store: &StoreService, query: &str) -> Result<Session, CliError> {
    let query = query.trim();
    if let Ok(id) = query.parse::<SessionId>() {
        if let Some(session) = store.get_session(&id).await? {
            return Ok(session);
        }
    }

    let sessions = store.list_sessions().await?;
    let mut matches = sessions
        .into_iter()
        .filter(|session| session.id.as_str().starts_with(query))
        .collect::<Vec<_>>();

    match matches.len() {
        0 => Err(CliError::SessionNotFound(query.to_string())),
        1 => Ok(matches.remove(0)),
        _ => Err(CliError::AmbiguousId(ambiguous_message(
            query,
            matches.iter().map(|session| session.id.as_str()),
        ))),
    }
}

fn ambiguous_message(query: &str, ids: impl Iterator<Item = String>) -> String {
    let options = ids.take(3).map(|id| short(&id)).collect::<Vec<_>>().join(", ");
    format!("ID prefix '{query}' is ambiguous; matches: {options}")
}

fn format_game_lines(games: &[Game]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    games
        .iter()
        .map(|game| {
            let short_id = short(&game.id.as_str());
            let position = match (game.top, game.bottom) {
                (true, true) => "top/bottom",
                (true, false) => "top",
                (false, true) => "bottom",
                (false, false) => "-",
            };
            let star = if game.favorite { "*" } else { " " };
            let marker = if game.pending { "  (unsynced)" } else { "" };
            let relative_time = format_relative_time(game.updated_at, now_ms);
            format!(
                "{short_id:<8} {star} {:<32}  {:<18}  {position:<10}  {relative_time}{marker}",
                game.name, game.topic
            )
        })
        .collect()
}

fn game_to_list_item(game: &Game) -> GameListItem {
    let now_ms = Utc::now().timestamp_millis();
    GameListItem {
        id: game.id.as_str(),
        name: game.name.clone(),
        topic: game.topic.clone(),
        top: game.top,
        bottom: game.bottom,
        favorite: game.favorite,
        pending: game.pending,
        updated_at: game.updated_at,
        relative_time: format_relative_time(game.updated_at, now_ms),
    }
}

fn session_to_list_item(session: &Session) -> SessionListItem {
    SessionListItem {
        id: session.id.as_str(),
        title: session.title.clone(),
        scheduled_for: session.scheduled_for,
        scheduled_for_iso: format_timestamp(session.scheduled_for),
        games: session.game_ids.len(),
        notes: session.notes.clone(),
        pending: session.pending,
    }
}

fn short(id: &str) -> String {
    id.chars().take(8).collect()
}

fn format_timestamp(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map_or_else(|| timestamp_ms.to_string(), |dt| dt.format("%Y-%m-%d %H:%M").to_string())
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format_timestamp(timestamp_ms)
    }
}

/// Parse a scheduling date. Bare dates default to an 18:00 class slot.
fn parse_when(raw: &str) -> Result<i64, CliError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M") {
        return Ok(naive.and_utc().timestamp_millis());
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(18, 0, 0) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }
    Err(CliError::InvalidDate(raw.to_string()))
}

fn resolve_db_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    if let Ok(path) = env::var("MATPLAN_DB_PATH") {
        return PathBuf::from(path);
    }
    dirs::data_local_dir().map_or_else(
        || PathBuf::from("matplan.db"),
        |dir| dir.join("matplan").join("matplan.db"),
    )
}

#[cfg(test)]
mod tests {
    use matplan_core::services::StoreService;
    use matplan_core::Game;
    use pretty_assertions::assert_eq;

    use super::{
        format_relative_time, parse_when, resolve_game, short, CliError,
    };

    #[test]
    fn parse_when_accepts_common_formats() {
        assert_eq!(
            parse_when("2026-03-02T18:30:00Z").unwrap(),
            1_772_476_200_000
        );
        assert_eq!(
            parse_when("2026-03-02 18:30").unwrap(),
            parse_when("2026-03-02T18:30:00Z").unwrap()
        );
        // Bare date defaults to 18:00
        assert_eq!(
            parse_when("2026-03-02").unwrap(),
            parse_when("2026-03-02T18:00:00Z").unwrap()
        );
        assert!(matches!(
            parse_when("next tuesday"),
            Err(CliError::InvalidDate(_))
        ));
    }

    #[test]
    fn format_relative_time_units() {
        let now = 10_000_000;
        assert_eq!(format_relative_time(now - 30_000, now), "just now");
        assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
        assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    }

    #[test]
    fn short_truncates_ids() {
        assert_eq!(short("0189aabb-ccdd-7eef-8001-223344556677"), "0189aabb");
        assert_eq!(short("abc"), "abc");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_game_supports_exact_and_prefix_id() {
        let store = StoreService::open_in_memory().await.unwrap();
        let game = store
            .create_game(Game::new("Knee Cut", "guard passing"))
            .await
            .unwrap();

        let by_exact = resolve_game(&store, &game.id.as_str()).await.unwrap();
        assert_eq!(by_exact.id, game.id);

        let prefix: String = game.id.as_str().chars().take(10).collect();
        let by_prefix = resolve_game(&store, &prefix).await.unwrap();
        assert_eq!(by_prefix.id, game.id);

        assert!(matches!(
            resolve_game(&store, "ffffffff").await,
            Err(CliError::GameNotFound(_))
        ));
    }
}
