//! Cache of the user's liked songs.
//!
//! Search ranks results by whether the user has liked them. Liked songs
//! change slowly and listing them takes one request per 50 songs, so the
//! ids are kept in `likedsongs.json` and rebuilt when stale.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{collect_pages, MusicService};
use crate::error::{Error, Result};
use crate::mob::{MobKind, Track};

/// Page size used when listing liked songs.
const SAVED_TRACKS_LIMIT: u32 = 50;

/// Ids derived from the user's liked songs.
///
/// An album or artist counts as liked when any liked song belongs to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikedSongs {
    /// Liked track ids.
    pub track: Vec<String>,
    /// Albums of liked tracks.
    pub album: Vec<String>,
    /// Artists of liked tracks.
    pub artist: Vec<String>,
    /// Number of liked songs when the cache was built.
    pub total: u32,
    /// When the cache was built.
    pub as_of: DateTime<Utc>,
}

impl LikedSongs {
    /// Derive the id lists from liked tracks.
    #[must_use]
    pub fn from_tracks<'a>(
        tracks: impl IntoIterator<Item = &'a Track>,
        total: u32,
        as_of: DateTime<Utc>,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut liked = Self {
            track: Vec::new(),
            album: Vec::new(),
            artist: Vec::new(),
            total,
            as_of,
        };
        let mut push = |list: &mut Vec<String>, kind: MobKind, id: &str| {
            if !id.is_empty() && seen.insert((kind, id.to_string())) {
                list.push(id.to_string());
            }
        };
        for track in tracks {
            push(&mut liked.track, MobKind::Track, &track.id);
            if let Some(album) = &track.album {
                push(&mut liked.album, MobKind::Album, &album.id);
            }
            for artist in &track.artists {
                push(&mut liked.artist, MobKind::Artist, &artist.id);
            }
        }
        liked
    }

    /// Ids of the given kind.
    #[must_use]
    pub fn ids(&self, kind: MobKind) -> &[String] {
        match kind {
            MobKind::Track => &self.track,
            MobKind::Album => &self.album,
            MobKind::Artist => &self.artist,
            _ => &[],
        }
    }

    /// Whether the id is liked as the given kind.
    #[must_use]
    pub fn contains(&self, kind: MobKind, id: &str) -> bool {
        self.ids(kind).iter().any(|liked| liked == id)
    }

    /// Whether this cache must be rebuilt, given the current total.
    #[must_use]
    pub fn is_stale(&self, total: u32, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.as_of > max_age || self.total != total
    }
}

/// The liked songs cache file.
#[derive(Debug, Clone)]
pub struct LikedCache {
    path: PathBuf,
    max_age: Duration,
}

impl LikedCache {
    /// A cache stored at `path`, rebuilt when older than `max_age`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    /// Path of the cache file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cached copy; `None` if missing or unreadable.
    #[must_use]
    pub fn load(&self) -> Option<LikedSongs> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&text)
            .map_err(|err| warn!("Ignoring unreadable liked songs cache: {err}"))
            .ok()
    }

    /// Write the cache file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, liked: &LikedSongs) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.path, serde_json::to_string(liked)?)?;
        Ok(())
    }

    /// The liked songs, rebuilt from Spotify when the cache is stale.
    ///
    /// # Errors
    ///
    /// Returns an error if Spotify cannot be reached or the cache cannot be
    /// written.
    pub async fn check(&self, service: &dyn MusicService) -> Result<LikedSongs> {
        let cached = self.load();
        let latest = service.saved_tracks(SAVED_TRACKS_LIMIT).await?;
        let now = Utc::now();
        if let Some(cached) = cached {
            if !cached.is_stale(latest.total, now, self.max_age) {
                debug!("Liked songs cache is current ({} songs)", cached.total);
                return Ok(cached);
            }
        }

        info!("Rebuilding liked songs cache ({} songs)", latest.total);
        let saved = collect_pages(service, &latest).await?;
        let liked = LikedSongs::from_tracks(saved.iter().map(|s| &s.track), latest.total, now);
        self.save(&liked)?;
        Ok(liked)
    }
}
