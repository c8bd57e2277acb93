//! CLI subcommand definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand};

use crate::storage::SeasonName;

/// Shell arguments.
#[derive(Debug, Default, Args)]
pub struct ShellCommand {
    /// Enable an extension sentence (repeatable)
    #[arg(short, long = "extension", value_name = "NAME", value_parser = ["shuffle", "projects"])]
    pub extensions: Vec<String>,
}

/// Backup arguments.
#[derive(Debug, Args)]
pub struct BackupCommand {
    /// The playlist to back up, as a search query, URI or URL
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,
}

impl BackupCommand {
    /// The query words joined by single spaces.
    #[must_use]
    pub fn query_text(&self) -> String {
        self.query.join(" ")
    }
}

/// Catalog inspection commands.
#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// Show counts and the database size
    Stats {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List backed-up playlists
    Playlists {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List the snapshots of a playlist
    History {
        /// Playlist ID or name
        playlist: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show what changed between the two latest snapshots of a playlist
    Diff {
        /// Playlist ID or name
        playlist: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Season commands.
#[derive(Debug, Subcommand)]
pub enum SeasonCommand {
    /// Add a season; omitted values are derived from the stored seasons
    Add {
        /// Last day (YYYY-MM-DD), default today
        #[arg(long)]
        end: Option<NaiveDate>,

        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Season name, e.g. S2021-3
        #[arg(long)]
        name: Option<SeasonName>,
    },

    /// List seasons
    List {
        /// Only this year
        #[arg(short, long)]
        year: Option<i32>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the season containing a date
    At {
        /// The date (YYYY-MM-DD)
        date: NaiveDate,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
