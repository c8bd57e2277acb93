//! The playlist catalog.
//!
//! A `SQLite` database holding backed-up playlists as a series of
//! snapshots, the tracks they referenced, and the seasons used to rank
//! listening periods.

pub mod migrations;
pub mod schema;
mod seasons;

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::mob::{Playlist, Track};

pub use seasons::{Season, SeasonName};

/// Storage for playlist backups.
#[derive(Debug)]
pub struct Catalog {
    path: PathBuf,
    conn: Connection,
}

/// A backed-up playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistRecord {
    /// Spotify ID.
    pub id: String,
    /// Spotify URI.
    pub uri: String,
    /// Name at the last backup.
    pub name: String,
    /// Owner's user ID.
    pub owner_id: String,
    /// First backup.
    pub first_seen: DateTime<Utc>,
    /// Most recent backup, whether or not it recorded a snapshot.
    pub last_backup: DateTime<Utc>,
    /// Number of stored snapshots.
    pub snapshot_count: i64,
}

/// One recorded version of a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRecord {
    /// Row ID.
    pub id: i64,
    /// Playlist this is a version of.
    pub playlist_id: String,
    /// When it was recorded.
    pub taken_at: DateTime<Utc>,
    /// Spotify's snapshot ID at the time.
    pub snapshot_id: String,
    /// Number of tracks.
    pub track_count: i64,
    /// BLAKE3 hash of the ordered track URIs.
    pub content_hash: String,
}

/// A track as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackRecord {
    /// Spotify ID.
    pub id: String,
    /// Spotify URI.
    pub uri: String,
    /// Track name.
    pub name: String,
    /// Artist names joined by ", ".
    pub artists: String,
    /// Album ID.
    pub album_id: Option<String>,
    /// Album name.
    pub album_name: Option<String>,
    /// Album release date.
    pub release_date: Option<String>,
    /// Length in milliseconds.
    pub duration_ms: i64,
}

/// Tracks added and removed between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    /// In the newer snapshot only.
    pub added: Vec<TrackRecord>,
    /// In the older snapshot only.
    pub removed: Vec<TrackRecord>,
}

impl SnapshotDiff {
    /// Whether the snapshots hold the same tracks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Counts and sizes for `catalog stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    /// Backed-up playlists.
    pub playlists: i64,
    /// Stored snapshots.
    pub snapshots: i64,
    /// Distinct tracks.
    pub tracks: i64,
    /// Oldest snapshot.
    pub oldest_snapshot: Option<DateTime<Utc>>,
    /// Newest snapshot.
    pub newest_snapshot: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Hash of an ordered list of track URIs.
#[must_use]
pub fn content_hash<S: AsRef<str>>(uris: &[S]) -> String {
    let mut hasher = blake3::Hasher::new();
    for uri in uris {
        hasher.update(uri.as_ref().as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text).map_or_else(|_| DateTime::<Utc>::default(), |dt| dt.with_timezone(&Utc))
}

const PLAYLIST_COLUMNS: &str = r"
    p.id, p.uri, p.name, p.owner_id, p.first_seen, p.last_backup,
    (SELECT COUNT(*) FROM snapshots s WHERE s.playlist_id = p.id)
";

const SNAPSHOT_COLUMNS: &str =
    "s.id, s.playlist_id, s.taken_at, s.snapshot_id, s.track_count, s.content_hash";

const TRACK_COLUMNS: &str =
    "t.id, t.uri, t.name, t.artists, t.album_id, t.album_name, t.release_date, t.duration_ms";

impl Catalog {
    /// Open or create a catalog, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening catalog at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Catalog opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// A catalog that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a playlist and its tracks.
    ///
    /// Returns the new snapshot's ID, or `None` if the tracks are the same
    /// as in the latest snapshot. Local files have no ID and are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn backup(&self, playlist: &Playlist, tracks: &[Track]) -> Result<Option<i64>> {
        let tracks: Vec<&Track> = tracks.iter().filter(|t| !t.id.is_empty()).collect();
        let uris: Vec<&str> = tracks.iter().map(|t| t.uri.as_str()).collect();
        let hash = content_hash(&uris);
        let now = timestamp(Utc::now());

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r"
            INSERT INTO playlists (id, uri, name, owner_id, first_seen, last_backup)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(id) DO UPDATE SET
                uri = excluded.uri, name = excluded.name,
                owner_id = excluded.owner_id, last_backup = excluded.last_backup
            ",
            params![playlist.id, playlist.uri, playlist.name, playlist.owner.id, now],
        )?;

        let latest: Option<String> = tx
            .query_row(
                r"
                SELECT content_hash FROM snapshots WHERE playlist_id = ?1
                ORDER BY taken_at DESC, id DESC LIMIT 1
                ",
                [&playlist.id],
                |row| row.get(0),
            )
            .optional()?;
        if latest.as_deref() == Some(hash.as_str()) {
            tx.commit()?;
            debug!("Playlist {} unchanged (hash {})", playlist.id, &hash[..16]);
            return Ok(None);
        }

        for track in &tracks {
            let artists = track
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let album = track.album.as_ref();
            tx.execute(
                r"
                INSERT INTO tracks (id, uri, name, artists, album_id, album_name,
                                    release_date, release_date_precision, duration_ms, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(id) DO UPDATE SET
                    uri = excluded.uri, name = excluded.name, artists = excluded.artists,
                    album_id = excluded.album_id, album_name = excluded.album_name,
                    release_date = excluded.release_date,
                    release_date_precision = excluded.release_date_precision,
                    duration_ms = excluded.duration_ms, updated_at = excluded.updated_at
                ",
                params![
                    track.id,
                    track.uri,
                    track.name,
                    artists,
                    album.map(|a| a.id.as_str()),
                    album.map(|a| a.name.as_str()),
                    album.map(|a| a.release_date.as_str()),
                    album.map(|a| a.release_date_precision.as_str()),
                    i64::try_from(track.duration_ms).unwrap_or(i64::MAX),
                    now,
                ],
            )?;
        }

        tx.execute(
            r"
            INSERT INTO snapshots (playlist_id, taken_at, snapshot_id, track_count, content_hash)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                playlist.id,
                now,
                playlist.snapshot_id,
                i64::try_from(tracks.len()).unwrap_or(i64::MAX),
                hash,
            ],
        )?;
        let id = tx.last_insert_rowid();
        {
            let mut insert = tx.prepare(
                "INSERT INTO snapshot_tracks (snapshot_id, position, track_id) VALUES (?1, ?2, ?3)",
            )?;
            for (position, track) in tracks.iter().enumerate() {
                insert.execute(params![id, i64::try_from(position).unwrap_or(i64::MAX), track.id])?;
            }
        }
        tx.commit()?;

        info!("Backed up {} as snapshot {} ({} tracks)", playlist.id, id, tracks.len());
        Ok(Some(id))
    }

    /// Every backed-up playlist, by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn playlists(&self) -> Result<Vec<PlaylistRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAYLIST_COLUMNS} FROM playlists p ORDER BY p.name COLLATE NOCASE, p.id"
        ))?;
        let playlists = stmt
            .query_map([], Self::row_to_playlist)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(playlists)
    }

    /// A playlist by ID, or else by case-insensitive name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_playlist(&self, id_or_name: &str) -> Result<Option<PlaylistRecord>> {
        let found = self
            .conn
            .query_row(
                &format!(
                    r"
                    SELECT {PLAYLIST_COLUMNS} FROM playlists p
                    WHERE p.id = ?1 OR p.name = ?1 COLLATE NOCASE
                    ORDER BY p.id = ?1 DESC LIMIT 1
                    "
                ),
                [id_or_name],
                Self::row_to_playlist,
            )
            .optional()?;
        Ok(found)
    }

    /// Snapshots of a playlist, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn snapshots(&self, playlist_id: &str) -> Result<Vec<SnapshotRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r"
            SELECT {SNAPSHOT_COLUMNS} FROM snapshots s
            WHERE s.playlist_id = ?1 ORDER BY s.taken_at DESC, s.id DESC
            "
        ))?;
        let snapshots = stmt
            .query_map([playlist_id], Self::row_to_snapshot)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }

    /// The tracks of a snapshot, in playlist order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn snapshot_tracks(&self, snapshot_id: i64) -> Result<Vec<TrackRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r"
            SELECT {TRACK_COLUMNS} FROM snapshot_tracks st
            JOIN tracks t ON t.id = st.track_id
            WHERE st.snapshot_id = ?1 ORDER BY st.position
            "
        ))?;
        let tracks = stmt
            .query_map([snapshot_id], Self::row_to_track)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    /// Tracks of `from` missing in `to`, each once, in `from` order.
    fn missing_tracks(&self, from: i64, to: i64) -> Result<Vec<TrackRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r"
            SELECT {TRACK_COLUMNS} FROM snapshot_tracks st
            JOIN tracks t ON t.id = st.track_id
            WHERE st.snapshot_id = ?1
              AND st.track_id NOT IN (SELECT track_id FROM snapshot_tracks WHERE snapshot_id = ?2)
            GROUP BY t.id ORDER BY MIN(st.position)
            "
        ))?;
        let tracks = stmt
            .query_map([from, to], Self::row_to_track)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    /// Tracks added and removed going from `older` to `newer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn diff(&self, older: i64, newer: i64) -> Result<SnapshotDiff> {
        Ok(SnapshotDiff {
            added: self.missing_tracks(newer, older)?,
            removed: self.missing_tracks(older, newer)?,
        })
    }

    /// Snapshots containing a track, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn track_history(&self, track_id: &str) -> Result<Vec<SnapshotRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r"
            SELECT {SNAPSHOT_COLUMNS} FROM snapshots s
            WHERE s.id IN (SELECT snapshot_id FROM snapshot_tracks WHERE track_id = ?1)
            ORDER BY s.taken_at, s.id
            "
        ))?;
        let snapshots = stmt
            .query_map([track_id], Self::row_to_snapshot)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }

    /// Catalog statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<CatalogStats> {
        let count = |table: &str| -> Result<i64> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        };
        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(taken_at), MAX(taken_at) FROM snapshots",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(CatalogStats {
            playlists: count("playlists")?,
            snapshots: count("snapshots")?,
            tracks: count("tracks")?,
            oldest_snapshot: oldest.as_deref().map(parse_timestamp),
            newest_snapshot: newest.as_deref().map(parse_timestamp),
            db_size_bytes,
        })
    }

    /// Delete all but the newest `keep` snapshots of a playlist.
    ///
    /// Returns the number of snapshots deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_keep_recent(&self, playlist_id: &str, keep: usize) -> Result<usize> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        let affected = self.conn.execute(
            r"
            DELETE FROM snapshots WHERE playlist_id = ?1 AND id NOT IN (
                SELECT id FROM snapshots WHERE playlist_id = ?1
                ORDER BY taken_at DESC, id DESC LIMIT ?2
            )
            ",
            params![playlist_id, keep],
        )?;
        if affected > 0 {
            info!("Pruned {affected} snapshots of {playlist_id}");
        }
        Ok(affected)
    }

    fn row_to_playlist(row: &rusqlite::Row) -> rusqlite::Result<PlaylistRecord> {
        Ok(PlaylistRecord {
            id: row.get(0)?,
            uri: row.get(1)?,
            name: row.get(2)?,
            owner_id: row.get(3)?,
            first_seen: parse_timestamp(&row.get::<_, String>(4)?),
            last_backup: parse_timestamp(&row.get::<_, String>(5)?),
            snapshot_count: row.get(6)?,
        })
    }

    fn row_to_snapshot(row: &rusqlite::Row) -> rusqlite::Result<SnapshotRecord> {
        Ok(SnapshotRecord {
            id: row.get(0)?,
            playlist_id: row.get(1)?,
            taken_at: parse_timestamp(&row.get::<_, String>(2)?),
            snapshot_id: row.get(3)?,
            track_count: row.get(4)?,
            content_hash: row.get(5)?,
        })
    }

    fn row_to_track(row: &rusqlite::Row) -> rusqlite::Result<TrackRecord> {
        Ok(TrackRecord {
            id: row.get(0)?,
            uri: row.get(1)?,
            name: row.get(2)?,
            artists: row.get(3)?,
            album_id: row.get(4)?,
            album_name: row.get(5)?,
            release_date: row.get(6)?,
            duration_ms: row.get(7)?,
        })
    }
}
