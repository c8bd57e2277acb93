//! Schema versioning for the catalog.
//!
//! The version lives in the `metadata` table. Each migration moves the
//! schema forward by one version.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Error, Result};

use super::schema::{CREATE_SEASONS_TABLE, SCHEMA_STATEMENTS};

/// The current schema version.
pub const CURRENT_VERSION: i32 = 2;

const VERSION_KEY: &str = "schema_version";

/// Create the base schema and run pending migrations.
///
/// # Errors
///
/// Returns an error if schema creation or a migration fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let mut version = schema_version(conn)?;
    while version < CURRENT_VERSION {
        version += 1;
        migrate(conn, version)?;
        set_schema_version(conn, version)?;
    }
    Ok(())
}

/// The stored schema version, 0 for a fresh database.
fn schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;
    match value {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

fn migrate(conn: &Connection, version: i32) -> Result<()> {
    match version {
        // The base schema is created by SCHEMA_STATEMENTS.
        1 => Ok(()),
        2 => {
            info!("Adding seasons to the catalog");
            conn.execute(CREATE_SEASONS_TABLE, [])?;
            Ok(())
        }
        _ => Err(Error::DatabaseMigration {
            message: format!("unknown migration version: {version}"),
        }),
    }
}
