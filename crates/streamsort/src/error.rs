//! Error types for streamsort.
//!
//! This module defines all error types used throughout the streamsort crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for streamsort operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the catalog database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Spotify API Errors ===
    /// The HTTP transport failed (connection refused, timeout, ...).
    #[error("connection error: {0}")]
    Http(#[from] reqwest::Error),

    /// Spotify answered with a non-success status.
    #[error("Spotify returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Body or reason returned by the server.
        message: String,
    },

    /// Spotify returned an object with an unfamiliar format.
    #[error("unexpected response from Spotify: {0}")]
    UnexpectedResponse(String),

    /// Authorization could not be obtained.
    #[error("authorization failed: {0}")]
    Auth(String),

    // === Shell Errors ===
    /// A search returned nothing the user accepted.
    #[error("no results")]
    NoResults,

    /// The verb cannot act on the current subject.
    #[error("'{verb}' is not supported for {subject}")]
    UnsupportedVerb {
        /// Display string of the subject.
        subject: String,
        /// The sentence name.
        verb: String,
    },

    /// The verb cannot take the given query.
    #[error("'{verb}' does not accept {query}")]
    UnsupportedQuery {
        /// The sentence name.
        verb: String,
        /// Display string of the query.
        query: String,
    },

    /// A line could not be interpreted.
    #[error("{0}")]
    Syntax(String),

    // === Season Errors ===
    /// The season itself is malformed (dates out of order or outside its year).
    #[error("invalid season: {0}")]
    InvalidSeason(String),

    /// Two seasons with the same name.
    #[error("season {name} already exists")]
    SeasonDuplicate {
        /// The duplicated season name.
        name: String,
    },

    /// The new season would overlap an existing one.
    #[error("season {name} would overlap {existing}")]
    SeasonIntersection {
        /// The new season name.
        name: String,
        /// The season it overlaps.
        existing: String,
    },

    /// The new season's name is not in the same order as its dates.
    #[error("season {name} is out of order: {message}")]
    SeasonOrder {
        /// The new season name.
        name: String,
        /// Which neighbour is out of order.
        message: String,
    },

    /// Seasons consecutive in name would not be consecutive in date.
    #[error("season {name} leaves a date gap next to {neighbour}")]
    SeasonGap {
        /// The new season name.
        name: String,
        /// The neighbouring season.
        neighbour: String,
    },

    /// Seasons consecutive in date would not be consecutive in name.
    #[error("season {name} is adjacent to {neighbour} but a season number is missing between them")]
    SeasonMissing {
        /// The new season name.
        name: String,
        /// The neighbouring season.
        neighbour: String,
    },

    /// The database already holds seasons consecutive in name but not date.
    #[error("stored seasons {first} and {second} are consecutive in name but not in date")]
    DbSeasonGap {
        /// The earlier season.
        first: String,
        /// The later season.
        second: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for streamsort operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new syntax error.
    #[must_use]
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new authorization error.
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create an unsupported verb error.
    #[must_use]
    pub fn unsupported_verb(subject: impl Into<String>, verb: impl Into<String>) -> Self {
        Self::UnsupportedVerb {
            subject: subject.into(),
            verb: verb.into(),
        }
    }

    /// Create an unsupported query error.
    #[must_use]
    pub fn unsupported_query(verb: impl Into<String>, query: impl Into<String>) -> Self {
        Self::UnsupportedQuery {
            verb: verb.into(),
            query: query.into(),
        }
    }

    /// Check if this error means a search found nothing.
    #[must_use]
    pub fn is_no_results(&self) -> bool {
        matches!(self, Self::NoResults)
    }

    /// Check if this error is a Spotify status error.
    #[must_use]
    pub fn is_api_error(&self) -> bool {
        matches!(self, Self::Api { .. } | Self::UnexpectedResponse(_))
    }

    /// Check if this error is a lost or failed connection, including a
    /// connection dropped while a response body was being read.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Http(err) => {
                err.is_connect() || err.is_timeout() || err.is_request() || err.is_body()
            }
            _ => false,
        }
    }

    /// HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
