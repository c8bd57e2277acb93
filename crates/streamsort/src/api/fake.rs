//! In-memory [`MusicService`] for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{MusicService, PlaybackRequest, SavedTrack, SearchResults};
use crate::error::{Error, Result};
use crate::mob::{Album, Mob, MobKind, Page, Playlist, PlaylistItem, Track, User};

/// A Spotify stand-in holding everything in memory.
///
/// Search ignores the query text and returns whatever was registered for
/// each kind with [`FakeService::set_search`].
#[derive(Debug)]
pub struct FakeService {
    user: User,
    mobs: Mutex<HashMap<String, Mob>>,
    search: Mutex<HashMap<MobKind, Vec<Mob>>>,
    pages: Mutex<HashMap<String, Value>>,
    followed_artists: Mutex<HashSet<String>>,
    followed_playlists: Mutex<HashSet<String>>,
    saved: Mutex<Vec<Track>>,
    artist_albums: Mutex<HashMap<String, Vec<Album>>>,
    /// Every playback request, in order.
    pub playback: Mutex<Vec<PlaybackRequest>>,
    /// Number of search requests made.
    pub searches: AtomicUsize,
    /// Number of saved-tracks requests made.
    pub saved_requests: AtomicUsize,
    /// Number of logins made.
    pub logins: AtomicUsize,
    fail_next: Mutex<Option<Error>>,
    logged_in: AtomicBool,
    next_id: AtomicUsize,
}

impl Default for FakeService {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeService {
    /// A service logged in as user `me`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            user: User {
                id: "me".to_string(),
                uri: "spotify:user:me".to_string(),
                display_name: Some("Me".to_string()),
            },
            mobs: Mutex::default(),
            search: Mutex::default(),
            pages: Mutex::default(),
            followed_artists: Mutex::default(),
            followed_playlists: Mutex::default(),
            saved: Mutex::default(),
            artist_albums: Mutex::default(),
            playback: Mutex::default(),
            searches: AtomicUsize::new(0),
            saved_requests: AtomicUsize::new(0),
            logins: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
            logged_in: AtomicBool::new(true),
            next_id: AtomicUsize::new(1),
        }
    }

    /// The logged-in user.
    #[must_use]
    pub fn user(&self) -> User {
        self.user.clone()
    }

    /// Make the next [`MusicService::fetch`] fail with `err`.
    pub fn fail_next_fetch(&self, err: Error) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    /// Register a full object for [`MusicService::fetch`].
    pub fn insert(&self, mob: Mob) {
        self.mobs.lock().unwrap().insert(mob.uri().to_string(), mob);
    }

    /// The stored object with this URI.
    pub fn get(&self, uri: &str) -> Option<Mob> {
        self.mobs.lock().unwrap().get(uri).cloned()
    }

    /// Register the results of every search for `kind`.
    pub fn set_search(&self, kind: MobKind, results: Vec<Mob>) {
        self.search.lock().unwrap().insert(kind, results);
    }

    /// Register the JSON behind a `next` link.
    pub fn add_page(&self, url: &str, value: Value) {
        self.pages.lock().unwrap().insert(url.to_string(), value);
    }

    /// Make the user follow an artist.
    pub fn follow_artist(&self, id: &str) {
        self.followed_artists.lock().unwrap().insert(id.to_string());
    }

    /// Make the user follow a playlist.
    pub fn follow_playlist(&self, id: &str) {
        self.followed_playlists.lock().unwrap().insert(id.to_string());
    }

    /// Replace the user's liked songs.
    pub fn set_saved(&self, tracks: Vec<Track>) {
        *self.saved.lock().unwrap() = tracks;
    }

    /// Register an artist's albums.
    pub fn set_artist_albums(&self, artist_id: &str, albums: Vec<Album>) {
        self.artist_albums
            .lock()
            .unwrap()
            .insert(artist_id.to_string(), albums);
    }

    /// Track URIs of a stored playlist, in order.
    pub fn playlist_uris(&self, id: &str) -> Vec<String> {
        match self.get(&format!("spotify:playlist:{id}")) {
            Some(Mob::Playlist(p)) => p
                .tracks
                .items
                .iter()
                .filter_map(|i| i.track.as_ref().map(|t| t.uri.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether the credentials are present.
    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn not_found(what: &str) -> Error {
        Error::Api {
            status: 404,
            message: format!("{what} not found"),
        }
    }

    fn edit_playlist(&self, id: &str, edit: impl FnOnce(&mut Vec<PlaylistItem>)) -> Result<()> {
        let uri = format!("spotify:playlist:{id}");
        let mut mobs = self.mobs.lock().unwrap();
        let Some(Mob::Playlist(playlist)) = mobs.get_mut(&uri) else {
            return Err(Self::not_found(&uri));
        };
        edit(&mut playlist.tracks.items);
        playlist.tracks.total = u32::try_from(playlist.tracks.items.len()).unwrap();
        playlist.snapshot_id = format!("snap{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        Ok(())
    }
}

#[async_trait]
impl MusicService for FakeService {
    async fn current_user(&self) -> Result<User> {
        Ok(self.user.clone())
    }

    async fn fetch(&self, kind: MobKind, id: &str) -> Result<Mob> {
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        let uri = format!("spotify:{kind}:{id}");
        self.get(&uri).ok_or_else(|| Self::not_found(&uri))
    }

    async fn search(&self, _query: &str, kinds: &[MobKind], limit: u32) -> Result<SearchResults> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let registered = self.search.lock().unwrap();
        let mut results = SearchResults::default();
        for &kind in kinds {
            let items: Vec<Mob> = registered
                .get(&kind)
                .map(|mobs| mobs.iter().take(limit as usize).cloned().collect())
                .unwrap_or_default();
            results.insert(kind, Page::complete(items));
        }
        Ok(results)
    }

    async fn page(&self, url: &str) -> Result<Value> {
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Self::not_found(url))
    }

    async fn following_artists(&self, ids: &[String]) -> Result<Vec<bool>> {
        let followed = self.followed_artists.lock().unwrap();
        Ok(ids.iter().map(|id| followed.contains(id)).collect())
    }

    async fn following_playlist(&self, playlist_id: &str, user_id: &str) -> Result<bool> {
        Ok(user_id == self.user.id && self.followed_playlists.lock().unwrap().contains(playlist_id))
    }

    async fn saved_tracks(&self, _limit: u32) -> Result<Page<SavedTrack>> {
        self.saved_requests.fetch_add(1, Ordering::SeqCst);
        let saved = self.saved.lock().unwrap();
        Ok(Page::complete(
            saved
                .iter()
                .map(|track| SavedTrack {
                    added_at: None,
                    track: track.clone(),
                })
                .collect(),
        ))
    }

    async fn artist_albums(&self, artist_id: &str) -> Result<Page<Album>> {
        let albums = self
            .artist_albums
            .lock()
            .unwrap()
            .get(artist_id)
            .cloned()
            .unwrap_or_default();
        Ok(Page::complete(albums))
    }

    async fn create_playlist(&self, user_id: &str, name: &str) -> Result<Playlist> {
        let id = format!("new{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let playlist = Playlist {
            uri: format!("spotify:playlist:{id}"),
            id,
            name: name.to_string(),
            owner: User {
                id: user_id.to_string(),
                ..User::default()
            },
            snapshot_id: "snap0".to_string(),
            tracks: Page::default(),
        };
        self.insert(Mob::Playlist(playlist.clone()));
        Ok(playlist)
    }

    async fn add_items(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        let tracks: Vec<PlaylistItem> = uris
            .iter()
            .map(|uri| {
                let track = match self.get(uri) {
                    Some(Mob::Track(track)) => track,
                    _ => Track {
                        uri: uri.clone(),
                        id: crate::mob::extract_id(uri).to_string(),
                        ..Track::default()
                    },
                };
                PlaylistItem {
                    added_at: None,
                    track: Some(track),
                }
            })
            .collect();
        self.edit_playlist(playlist_id, |items| items.extend(tracks))
    }

    async fn remove_all_items(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        self.edit_playlist(playlist_id, |items| {
            items.retain(|item| !item.track.as_ref().is_some_and(|t| uris.contains(&t.uri)));
        })
    }

    async fn start_playback(&self, request: &PlaybackRequest) -> Result<()> {
        self.playback.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn login(&self) -> Result<()> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn logout(&self) -> bool {
        self.logged_in.swap(false, Ordering::SeqCst)
    }
}
