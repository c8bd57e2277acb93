//! Configuration management for streamsort.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "streamsort";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "catalog.db";

/// Token cache file name inside the cache directory.
const TOKEN_FILE_NAME: &str = "api.json";

/// Liked songs cache file name inside the cache directory.
const LIKED_SONGS_FILE_NAME: &str = "likedsongs.json";

/// Public client id registered for streamsort.
pub const CLIENT_ID: &str = "6400ca69c7dd4b969f2620d6d2647b03";

/// Redirect URI registered for the client id.
pub const REDIRECT_URI: &str = "http://localhost:8080";

/// Scopes requested at login.
pub const SCOPE: &str = "user-library-read user-follow-read playlist-read-private \
                         playlist-modify-private playlist-modify-public \
                         user-modify-playback-state";

/// Extensions that can be enabled in the shell.
pub const KNOWN_EXTENSIONS: &[&str] = &["shuffle", "projects"];

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `STREAMSORT_`, `__` between levels)
/// 2. TOML config file at `~/.config/streamsort/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Spotify API configuration.
    pub spotify: SpotifyConfig,
    /// Cache configuration.
    pub cache: CacheConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Search configuration.
    pub search: SearchConfig,
    /// Shell configuration.
    pub shell: ShellConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Spotify-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth redirect URI. The login flow listens on its host and port.
    pub redirect_uri: String,
    /// Space-separated OAuth scopes.
    pub scope: String,
    /// Base URL of the Web API.
    pub api_url: String,
    /// Base URL of the accounts service.
    pub accounts_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// Cache-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory for the token and liked songs caches.
    /// Defaults to `~/.cache/streamsort`
    pub directory: Option<PathBuf>,
    /// Maximum age of the liked songs cache in days.
    pub liked_songs_max_age_days: u32,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the catalog database file.
    /// Defaults to `~/.local/share/streamsort/catalog.db`
    pub database_path: Option<PathBuf>,
}

/// Search-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results requested per kind (Spotify allows 1-50).
    pub limit: u32,
    /// Candidates offered for confirmation before giving up on a tier.
    pub suggestions: usize,
}

/// Shell-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Extensions enabled in every shell session.
    pub extensions: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append log lines to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: CLIENT_ID.to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
            scope: SCOPE.to_string(),
            api_url: "https://api.spotify.com/v1".to_string(),
            accounts_url: "https://accounts.spotify.com".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            liked_songs_max_age_days: 6,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: 50,
            suggestions: 3,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("STREAMSORT_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Get the default cache directory path.
    #[must_use]
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if !(1..=50).contains(&self.search.limit) {
            return Err(Error::ConfigValidation {
                message: format!("search.limit ({}) must be between 1 and 50", self.search.limit),
            });
        }

        if self.search.suggestions == 0 {
            return Err(Error::ConfigValidation {
                message: "search.suggestions must be greater than 0".to_string(),
            });
        }

        if self.spotify.timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "spotify.timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.spotify.client_id.is_empty() {
            return Err(Error::ConfigValidation {
                message: "spotify.client_id must not be empty".to_string(),
            });
        }

        self.redirect_address()?;

        for extension in &self.shell.extensions {
            if !KNOWN_EXTENSIONS.contains(&extension.as_str()) {
                return Err(Error::ConfigValidation {
                    message: format!("unknown extension: {extension}"),
                });
            }
        }

        Ok(())
    }

    /// Host and port the login flow listens on, taken from the redirect URI.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI is not an `http` URL with a host.
    pub fn redirect_address(&self) -> Result<(String, u16)> {
        let invalid = |why: &str| Error::ConfigValidation {
            message: format!("invalid redirect_uri {}: {why}", self.spotify.redirect_uri),
        };
        let url = reqwest::Url::parse(&self.spotify.redirect_uri).map_err(|_| invalid("not a URL"))?;
        if url.scheme() != "http" {
            return Err(invalid("scheme must be http"));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let port = url.port_or_known_default().ok_or_else(|| invalid("missing port"))?;
        Ok((host.to_string(), port))
    }

    /// Get the cache directory, resolving defaults if not set.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .directory
            .clone()
            .unwrap_or_else(Self::default_cache_dir)
    }

    /// Path of the OAuth token cache.
    #[must_use]
    pub fn token_path(&self) -> PathBuf {
        self.cache_dir().join(TOKEN_FILE_NAME)
    }

    /// Path of the liked songs cache.
    #[must_use]
    pub fn liked_songs_path(&self) -> PathBuf {
        self.cache_dir().join(LIKED_SONGS_FILE_NAME)
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Maximum age of the liked songs cache.
    #[must_use]
    pub fn liked_songs_max_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.cache.liked_songs_max_age_days))
    }

    /// Request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.spotify.timeout_secs)
    }
}
