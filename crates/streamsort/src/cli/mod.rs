//! Command-line interface for the `streamsort` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{BackupCommand, CatalogCommand, ConfigCommand, SeasonCommand, ShellCommand};

/// streamsort - Power tools for your playlists
///
/// An interactive shell for searching, editing, shuffling and backing up
/// Spotify playlists.
#[derive(Debug, Parser)]
#[command(name = "streamsort")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute (default: shell)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the interactive shell
    Shell(ShellCommand),

    /// Log in to Spotify and store the token
    Login,

    /// Delete the stored token
    Logout,

    /// Back up a playlist to the catalog
    Backup(BackupCommand),

    /// Inspect the backup catalog
    #[command(subcommand)]
    Catalog(CatalogCommand),

    /// Manage seasons
    #[command(subcommand)]
    Season(SeasonCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.quiet, self.verbose)
    }

    /// The command to run; the shell when none was given.
    #[must_use]
    pub fn into_command(self) -> Command {
        self.command
            .unwrap_or_else(|| Command::Shell(ShellCommand::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Verbosity;
    use crate::storage::SeasonName;
    use chrono::NaiveDate;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), "streamsort");
    }

    #[test]
    fn test_default_is_shell() {
        let cli = parse(&["streamsort"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.into_command(), Command::Shell(ShellCommand { ref extensions }) if extensions.is_empty()));
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(parse(&["streamsort", "-q"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["streamsort"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["streamsort", "-v", "login"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["streamsort", "-vv"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_shell_extensions() {
        let cli = parse(&["streamsort", "shell", "-e", "shuffle", "--extension", "projects"]);
        let Some(Command::Shell(shell)) = cli.command else {
            panic!("expected shell");
        };
        assert_eq!(shell.extensions, vec!["shuffle", "projects"]);
        assert!(Cli::try_parse_from(["streamsort", "shell", "-e", "karaoke"]).is_err());
    }

    #[test]
    fn test_backup_query_words() {
        let cli = parse(&["streamsort", "backup", "road", "trip"]);
        let Some(Command::Backup(backup)) = cli.command else {
            panic!("expected backup");
        };
        assert_eq!(backup.query_text(), "road trip");
        assert!(Cli::try_parse_from(["streamsort", "backup"]).is_err());
    }

    #[test]
    fn test_catalog_commands() {
        let cli = parse(&["streamsort", "catalog", "diff", "Road Trip", "--json"]);
        assert!(matches!(
            cli.command,
            Some(Command::Catalog(CatalogCommand::Diff { ref playlist, json: true })) if playlist == "Road Trip"
        ));
    }

    #[test]
    fn test_season_add_parses_values() {
        let cli = parse(&["streamsort", "season", "add", "--end", "2021-06-30", "--name", "S2021-2"]);
        let Some(Command::Season(SeasonCommand::Add { end, start, name })) = cli.command else {
            panic!("expected season add");
        };
        assert_eq!(end, NaiveDate::from_ymd_opt(2021, 6, 30));
        assert!(start.is_none());
        assert_eq!(name, Some(SeasonName::new(2021, 2)));
        assert!(Cli::try_parse_from(["streamsort", "season", "add", "--name", "bad"]).is_err());
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["streamsort", "-c", "/custom/config.toml", "config", "path"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }
}
