//! `streamsort` - CLI for the playlist shell
//!
//! Parses arguments, loads configuration and logging, then either runs the
//! interactive shell or one of the one-shot commands.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use streamsort::cli::{CatalogCommand, Cli, Command, ConfigCommand, SeasonCommand, ShellCommand};
use streamsort::sentences::{Backup, Sentence};
use streamsort::storage::{Catalog, Season, SnapshotRecord, TrackRecord};
use streamsort::{
    init_logging, Authenticator, Config, ConsoleInteraction, Interaction, Mob, MusicService, Query,
    Sentences, Session, Shell, SpotifyClient, State,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;
    init_logging(cli.verbosity(), config.logging.file.as_deref()).context("opening log file")?;

    match cli.into_command() {
        Command::Shell(cmd) => run_shell(&config, &cmd).await,
        Command::Login => {
            let service = connect(&config)?;
            service.login().await?;
            let user = service.current_user().await?;
            println!("Logged in as {}", Mob::User(user));
            Ok(())
        }
        Command::Logout => {
            let auth = Authenticator::new(&config, console())?;
            if auth.logout() {
                println!("Logged out.");
            } else {
                println!("Logout failed: no token at {}", auth.token_path().display());
            }
            Ok(())
        }
        Command::Backup(cmd) => {
            let session = start_session(&config).await?;
            let subject = State::new(Mob::User(session.user().clone()));
            Backup
                .run(&session, &subject, Query::from(cmd.query_text().as_str()))
                .await?;
            Ok(())
        }
        Command::Catalog(cmd) => handle_catalog(&config, cmd),
        Command::Season(cmd) => handle_season(&config, cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn console() -> Arc<dyn Interaction> {
    Arc::new(ConsoleInteraction)
}

fn connect(config: &Config) -> anyhow::Result<Arc<dyn MusicService>> {
    let auth = Authenticator::new(config, console())?;
    Ok(Arc::new(SpotifyClient::new(config, auth)?))
}

async fn start_session(config: &Config) -> anyhow::Result<Session> {
    let service = connect(config)?;
    let catalog = Catalog::open(config.database_path())
        .with_context(|| format!("opening catalog {}", config.database_path().display()))?;
    Ok(Session::start(config, service, console()).await?.with_catalog(catalog))
}

async fn run_shell(config: &Config, cmd: &ShellCommand) -> anyhow::Result<()> {
    let mut extensions = config.shell.extensions.clone();
    for name in &cmd.extensions {
        if !extensions.contains(name) {
            extensions.push(name.clone());
        }
    }
    let sentences = Sentences::with_extensions(&extensions)?;
    let session = start_session(config).await?;
    let mut shell = Shell::new(session, sentences);
    shell.run().await;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_tracks(heading: &str, tracks: &[TrackRecord]) {
    println!("{heading} ({})", tracks.len());
    for track in tracks {
        println!("  {} - {}", track.name, track.artists);
    }
}

fn print_snapshots(snapshots: &[SnapshotRecord]) {
    for snapshot in snapshots {
        println!(
            "  #{:<6} {}  {:>5} tracks  {}",
            snapshot.id,
            snapshot.taken_at.format("%Y-%m-%d %H:%M"),
            snapshot.track_count,
            &snapshot.content_hash[..12.min(snapshot.content_hash.len())]
        );
    }
}

fn print_season(season: &Season) {
    println!("  {:<10} {} to {}", season.name.to_string(), season.start, season.end);
}

fn handle_catalog(config: &Config, cmd: CatalogCommand) -> anyhow::Result<()> {
    let catalog = Catalog::open(config.database_path())?;
    match cmd {
        CatalogCommand::Stats { json } => {
            let stats = catalog.stats()?;
            if json {
                return print_json(&stats);
            }
            println!("streamsort catalog");
            println!("------------------");
            println!("Database:   {}", catalog.path().display());
            println!("Playlists:  {}", stats.playlists);
            println!("Snapshots:  {}", stats.snapshots);
            println!("Tracks:     {}", stats.tracks);
            if let (Some(oldest), Some(newest)) = (stats.oldest_snapshot, stats.newest_snapshot) {
                println!("Oldest:     {}", oldest.format("%Y-%m-%d %H:%M"));
                println!("Newest:     {}", newest.format("%Y-%m-%d %H:%M"));
            }
            println!("Size:       {} bytes", stats.db_size_bytes);
        }
        CatalogCommand::Playlists { json } => {
            let playlists = catalog.playlists()?;
            if json {
                return print_json(&playlists);
            }
            for playlist in &playlists {
                println!(
                    "{:<24} {:<40} {:>4} snapshots  last {}",
                    playlist.id,
                    playlist.name,
                    playlist.snapshot_count,
                    playlist.last_backup.format("%Y-%m-%d")
                );
            }
        }
        CatalogCommand::History { playlist, json } => {
            let Some(found) = catalog.find_playlist(&playlist)? else {
                bail!("no backed-up playlist named {playlist}");
            };
            let snapshots = catalog.snapshots(&found.id)?;
            if json {
                return print_json(&snapshots);
            }
            println!("{} ({})", found.name, found.id);
            print_snapshots(&snapshots);
        }
        CatalogCommand::Diff { playlist, json } => {
            let Some(found) = catalog.find_playlist(&playlist)? else {
                bail!("no backed-up playlist named {playlist}");
            };
            let snapshots = catalog.snapshots(&found.id)?;
            let [newer, older, ..] = snapshots.as_slice() else {
                bail!("{} has fewer than two snapshots", found.name);
            };
            let diff = catalog.diff(older.id, newer.id)?;
            if json {
                return print_json(&diff);
            }
            println!("{}: snapshot #{} to #{}", found.name, older.id, newer.id);
            print_tracks("Added", &diff.added);
            print_tracks("Removed", &diff.removed);
        }
    }
    Ok(())
}

fn handle_season(config: &Config, cmd: SeasonCommand) -> anyhow::Result<()> {
    let catalog = Catalog::open(config.database_path())?;
    match cmd {
        SeasonCommand::Add { end, start, name } => {
            let season = catalog.add_season(end, start, name)?;
            println!("Added season:");
            print_season(&season);
        }
        SeasonCommand::List { year, json } => {
            let seasons = catalog.seasons(year)?;
            if json {
                return print_json(&seasons);
            }
            for season in &seasons {
                print_season(season);
            }
            if let Some(year) = year {
                catalog.verify_seasons(year)?;
            }
        }
        SeasonCommand::At { date } => match catalog.season_at(date)? {
            Some(season) => print_season(&season),
            None => println!("No season contains {date}"),
        },
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                return print_json(config);
            }
            println!("Current Configuration");
            println!("=====================");
            println!();
            println!("[Spotify]");
            println!("  Client ID:          {}", config.spotify.client_id);
            println!("  Redirect URI:       {}", config.spotify.redirect_uri);
            println!("  Timeout (secs):     {}", config.spotify.timeout_secs);
            println!();
            println!("[Cache]");
            println!("  Directory:          {}", config.cache_dir().display());
            println!("  Liked max age:      {} days", config.cache.liked_songs_max_age_days);
            println!();
            println!("[Storage]");
            println!("  Database path:      {}", config.database_path().display());
            println!();
            println!("[Search]");
            println!("  Limit:              {}", config.search.limit);
            println!("  Suggestions:        {}", config.search.suggestions);
            println!();
            println!("[Shell]");
            println!("  Extensions:         {}", config.shell.extensions.join(", "));
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
