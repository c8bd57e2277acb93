//! `SQLite` schema for the playlist catalog.

/// Tracks seen in any backed-up playlist.
pub const CREATE_TRACKS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS tracks (
    id TEXT PRIMARY KEY,
    uri TEXT NOT NULL,
    name TEXT NOT NULL,
    artists TEXT NOT NULL,
    album_id TEXT,
    album_name TEXT,
    release_date TEXT,
    release_date_precision TEXT,
    duration_ms INTEGER NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// Playlists that have been backed up at least once.
pub const CREATE_PLAYLISTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS playlists (
    id TEXT PRIMARY KEY,
    uri TEXT NOT NULL,
    name TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    first_seen TEXT NOT NULL,
    last_backup TEXT NOT NULL
)
";

/// One row per recorded version of a playlist.
pub const CREATE_SNAPSHOTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    playlist_id TEXT NOT NULL REFERENCES playlists(id),
    taken_at TEXT NOT NULL,
    snapshot_id TEXT NOT NULL,
    track_count INTEGER NOT NULL,
    content_hash TEXT NOT NULL
)
";

/// Ordered contents of each snapshot.
pub const CREATE_SNAPSHOT_TRACKS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS snapshot_tracks (
    snapshot_id INTEGER NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    track_id TEXT NOT NULL REFERENCES tracks(id),
    PRIMARY KEY (snapshot_id, position)
)
";

/// Snapshots of a playlist, newest first.
pub const CREATE_SNAPSHOTS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_snapshots_playlist ON snapshots(playlist_id, taken_at DESC)
";

/// Lookup of snapshots by track.
pub const CREATE_SNAPSHOT_TRACKS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_snapshot_tracks_track ON snapshot_tracks(track_id)
";

/// Key-value pairs, including the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Ranking periods, added in schema version 2.
pub const CREATE_SEASONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS seasons (
    name TEXT PRIMARY KEY,
    year INTEGER NOT NULL,
    number INTEGER NOT NULL,
    start TEXT NOT NULL,
    "end" TEXT NOT NULL,
    ext_name TEXT,
    ext_id TEXT
)
"#;

/// Statements for the base (version 1) schema, in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_TRACKS_TABLE,
    CREATE_PLAYLISTS_TABLE,
    CREATE_SNAPSHOTS_TABLE,
    CREATE_SNAPSHOT_TRACKS_TABLE,
    CREATE_SNAPSHOTS_INDEX,
    CREATE_SNAPSHOT_TRACKS_INDEX,
    CREATE_METADATA_TABLE,
];
