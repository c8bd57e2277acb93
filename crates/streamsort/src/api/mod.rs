//! Access to the Spotify Web API.
//!
//! [`MusicService`] is the seam between streamsort's logic and the network.
//! [`SpotifyClient`] talks to Spotify; tests use an in-memory fake.

pub mod auth;
#[cfg(test)]
pub mod fake;
pub mod spotify;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::mob::{Album, Mob, MobKind, Page, Playlist, Track, User};

pub use auth::Authenticator;
pub use spotify::SpotifyClient;

/// Maximum ids per "does the user follow" request.
pub const FOLLOW_BATCH: usize = 50;

/// Maximum items per playlist edit request.
pub const EDIT_BATCH: usize = 100;

/// A liked song.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedTrack {
    /// When the song was liked.
    #[serde(default)]
    pub added_at: Option<String>,
    /// The song.
    pub track: Track,
}

/// The first page of results for each searched kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pages: HashMap<MobKind, Page<Mob>>,
}

impl SearchResults {
    /// Results for one kind; empty when that kind was not searched.
    #[must_use]
    pub fn items(&self, kind: MobKind) -> &[Mob] {
        self.pages.get(&kind).map_or(&[], |p| p.items.as_slice())
    }

    /// The page for one kind, if searched.
    #[must_use]
    pub fn page(&self, kind: MobKind) -> Option<&Page<Mob>> {
        self.pages.get(&kind)
    }

    /// Set the page for one kind.
    pub fn insert(&mut self, kind: MobKind, page: Page<Mob>) {
        self.pages.insert(kind, page);
    }

    /// Build from a raw search response (`{"tracks": {...}, "albums": ...}`).
    ///
    /// Null entries, which Spotify returns for unavailable playlists, are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if a page does not have the expected shape.
    pub fn from_response(response: Value, kinds: &[MobKind]) -> Result<Self> {
        let mut results = Self::default();
        let Value::Object(mut map) = response else {
            return Err(Error::UnexpectedResponse(
                "search response is not an object".to_string(),
            ));
        };
        for &kind in kinds {
            let Some(value) = map.remove(&kind.plural()) else {
                continue;
            };
            let page: Page<Option<Mob>> = serde_json::from_value(value)?;
            results.insert(
                kind,
                Page {
                    items: page.items.into_iter().flatten().collect(),
                    next: page.next,
                    total: page.total,
                },
            );
        }
        Ok(results)
    }
}

/// What to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackRequest {
    /// An explicit list of track URIs.
    Uris(Vec<String>),
    /// An album, artist or playlist, optionally starting at a track.
    Context {
        /// URI of the context.
        context_uri: String,
        /// URI of the first track to play.
        offset: Option<String>,
    },
}

impl PlaybackRequest {
    /// The JSON body of a start-playback request.
    #[must_use]
    pub fn body(&self) -> Value {
        match self {
            Self::Uris(uris) => serde_json::json!({ "uris": uris }),
            Self::Context {
                context_uri,
                offset: Some(offset),
            } => serde_json::json!({ "context_uri": context_uri, "offset": { "uri": offset } }),
            Self::Context {
                context_uri,
                offset: None,
            } => serde_json::json!({ "context_uri": context_uri }),
        }
    }
}

/// Everything streamsort needs from Spotify.
#[async_trait]
pub trait MusicService: Send + Sync {
    /// The logged-in user.
    async fn current_user(&self) -> Result<User>;

    /// The full object of the given kind and id.
    async fn fetch(&self, kind: MobKind, id: &str) -> Result<Mob>;

    /// First pages of a search over the given kinds.
    async fn search(&self, query: &str, kinds: &[MobKind], limit: u32) -> Result<SearchResults>;

    /// Raw JSON behind a `next` link.
    async fn page(&self, url: &str) -> Result<Value>;

    /// Whether the user follows each artist, in order.
    async fn following_artists(&self, ids: &[String]) -> Result<Vec<bool>>;

    /// Whether `user_id` follows the playlist.
    async fn following_playlist(&self, playlist_id: &str, user_id: &str) -> Result<bool>;

    /// First page of the user's liked songs.
    async fn saved_tracks(&self, limit: u32) -> Result<Page<SavedTrack>>;

    /// First page of an artist's albums and singles.
    async fn artist_albums(&self, artist_id: &str) -> Result<Page<Album>>;

    /// Create an empty playlist.
    async fn create_playlist(&self, user_id: &str, name: &str) -> Result<Playlist>;

    /// Append tracks to a playlist.
    async fn add_items(&self, playlist_id: &str, uris: &[String]) -> Result<()>;

    /// Remove every occurrence of the tracks from a playlist.
    async fn remove_all_items(&self, playlist_id: &str, uris: &[String]) -> Result<()>;

    /// Start playback on the user's active device.
    async fn start_playback(&self, request: &PlaybackRequest) -> Result<()>;

    /// Make sure the service holds usable credentials, logging in if needed.
    async fn login(&self) -> Result<()>;

    /// Forget stored credentials. Returns whether they were removed.
    fn logout(&self) -> bool;
}

/// Parse a `next` page, unwrapping a `{"tracks": {...}}` style wrapper.
fn unwrap_page<T: DeserializeOwned>(value: Value) -> Result<Page<T>> {
    if value.get("items").is_some() {
        return Ok(serde_json::from_value(value)?);
    }
    let Value::Object(mut map) = value else {
        return Err(Error::UnexpectedResponse("page is not an object".to_string()));
    };
    let key = MobKind::SEARCHABLE
        .iter()
        .map(|k| k.plural())
        .find(|key| map.contains_key(key))
        .ok_or_else(|| Error::UnexpectedResponse("page has no items".to_string()))?;
    let inner = map.remove(&key).unwrap_or_default();
    Ok(serde_json::from_value(inner)?)
}

/// All items of a paged listing: the first page, then every `next` page.
///
/// Spotify refuses search pages past offset 1000; such a failure ends the
/// listing instead of failing it.
///
/// # Errors
///
/// Returns an error if a page cannot be fetched or parsed.
pub async fn collect_pages<T>(service: &dyn MusicService, first: &Page<T>) -> Result<Vec<T>>
where
    T: DeserializeOwned + Clone + Send + Sync,
{
    let mut items = first.items.clone();
    let mut next = first.next.clone();
    while let Some(url) = next {
        let value = match service.page(&url).await {
            Ok(value) => value,
            Err(err) if err.status().is_some() && url.contains("offset=1000") => {
                debug!("Stopping pagination at search window end: {err}");
                break;
            }
            Err(err) => return Err(err),
        };
        let page: Page<T> = unwrap_page(value)?;
        items.extend(page.items);
        next = page.next;
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::fake::FakeService;
    use super::*;
    use serde_json::json;

    fn track(n: u32) -> Value {
        json!({"type": "track", "id": format!("t{n}"), "uri": format!("spotify:track:t{n}"), "name": format!("Track {n}")})
    }

    #[tokio::test]
    async fn test_collect_pages_follows_next() {
        let service = FakeService::new();
        service.add_page(
            "https://api/next1",
            json!({"items": [track(2)], "next": "https://api/next2", "total": 3}),
        );
        service.add_page(
            "https://api/next2",
            json!({"tracks": {"items": [track(3)], "next": null, "total": 3}}),
        );

        let first: Page<Track> = serde_json::from_value(
            json!({"items": [track(1)], "next": "https://api/next1", "total": 3}),
        )
        .unwrap();
        let all = collect_pages(&service, &first).await.unwrap();
        let names: Vec<_> = all.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Track 1", "Track 2", "Track 3"]);
    }

    #[tokio::test]
    async fn test_collect_pages_stops_at_search_window() {
        let service = FakeService::new();
        let first: Page<Track> = serde_json::from_value(json!({
            "items": [track(1)],
            "next": "https://api/search?q=x&offset=1000&limit=50",
            "total": 5000
        }))
        .unwrap();
        let all = collect_pages(&service, &first).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_collect_pages_propagates_other_errors() {
        let service = FakeService::new();
        let first: Page<Track> = serde_json::from_value(json!({
            "items": [track(1)],
            "next": "https://api/missing?offset=100",
            "total": 200
        }))
        .unwrap();
        let err = collect_pages(&service, &first).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_search_results_drop_null_items() {
        let response = json!({
            "playlists": {"items": [null, {"type": "playlist", "id": "p1", "uri": "spotify:playlist:p1", "name": "Mix", "tracks": {"total": 3}}], "next": null, "total": 2},
            "tracks": {"items": [track(1)], "next": null, "total": 1}
        });
        let results =
            SearchResults::from_response(response, &[MobKind::Track, MobKind::Playlist]).unwrap();
        assert_eq!(results.items(MobKind::Playlist).len(), 1);
        assert_eq!(results.items(MobKind::Track).len(), 1);
        assert!(results.items(MobKind::Album).is_empty());
    }

    #[test]
    fn test_playback_body() {
        let body = PlaybackRequest::Context {
            context_uri: "spotify:album:a".to_string(),
            offset: Some("spotify:track:t".to_string()),
        }
        .body();
        assert_eq!(body["context_uri"], "spotify:album:a");
        assert_eq!(body["offset"]["uri"], "spotify:track:t");

        let body = PlaybackRequest::Uris(vec!["spotify:track:t".to_string()]).body();
        assert_eq!(body["uris"][0], "spotify:track:t");
    }
}
