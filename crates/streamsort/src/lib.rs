//! `streamsort` - Power tools for your playlists
//!
//! This library provides an interactive shell over the Spotify Web API:
//! music objects and how they contain each other, a tiered search that
//! understands the user's library, sentences that edit and play playlists,
//! and a `SQLite` catalog of playlist backups.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod api;
pub mod cli;
pub mod config;
pub mod contain;
pub mod error;
pub mod interaction;
pub mod liked;
pub mod logging;
pub mod mob;
pub mod search;
pub mod sentences;
pub mod session;
pub mod shell;
pub mod state;
pub mod storage;

pub use api::{Authenticator, MusicService, SpotifyClient};
pub use config::Config;
pub use error::{Error, Result};
pub use interaction::{ConsoleInteraction, Interaction};
pub use logging::init_logging;
pub use mob::{Mob, MobKind};
pub use search::Query;
pub use sentences::Sentences;
pub use session::Session;
pub use shell::Shell;
pub use state::State;
pub use storage::{Catalog, CatalogStats};
