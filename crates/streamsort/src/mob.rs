//! Music objects ("mobs") as returned by the Spotify Web API.
//!
//! A mob is a track, album, artist, playlist or user, plus the
//! [`Collection`] type streamsort builds itself. Mobs deserialize straight
//! from API JSON, dispatching on the `type` field.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// Prefix of every Spotify URI.
pub const MOB_URI_PREFIX: &str = "spotify:";

/// Prefix of every shareable Spotify URL.
pub const MOB_URL_PREFIX: &str = "https://open.spotify.com/";

/// Length of a Spotify id.
pub const SPID_LEN: usize = 22;

/// The kind of a music object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MobKind {
    /// A single recording.
    Track,
    /// A release.
    Album,
    /// A performer.
    Artist,
    /// A user playlist.
    Playlist,
    /// A Spotify account.
    User,
    /// A list built by streamsort.
    #[serde(rename = "ss")]
    Collection,
}

impl MobKind {
    /// Kinds that can be searched for, in search priority order.
    pub const SEARCHABLE: [MobKind; 4] = [Self::Track, Self::Album, Self::Artist, Self::Playlist];

    /// The API name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Artist => "artist",
            Self::Playlist => "playlist",
            Self::User => "user",
            Self::Collection => "ss",
        }
    }

    /// Parse one of the searchable kind names.
    #[must_use]
    pub fn searchable(name: &str) -> Option<Self> {
        Self::SEARCHABLE.into_iter().find(|k| k.as_str() == name)
    }

    /// The key Spotify uses for this kind in search responses (`tracks`, ...).
    #[must_use]
    pub fn plural(self) -> String {
        format!("{}s", self.as_str())
    }
}

impl fmt::Display for MobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deserialize `null` the same way as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A page of results following Spotify's paging object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    /// Items on this page.
    #[serde(default = "Vec::new", deserialize_with = "null_as_default")]
    pub items: Vec<T>,
    /// URL of the next page, if any.
    #[serde(default)]
    pub next: Option<String>,
    /// Total number of items across all pages.
    #[serde(default)]
    pub total: u32,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next: None,
            total: 0,
        }
    }
}

impl<T> Page<T> {
    /// A single, complete page.
    #[must_use]
    pub fn complete(items: Vec<T>) -> Self {
        let total = u32::try_from(items.len()).unwrap_or(u32::MAX);
        Self {
            items,
            next: None,
            total,
        }
    }
}

/// An artist as referenced from tracks and albums.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    /// Spotify id (empty for local files).
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Spotify URI (empty for local files).
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri: String,
    /// Artist name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

/// An album as referenced from tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRef {
    /// Spotify id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Spotify URI.
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri: String,
    /// Album name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// `album`, `single` or `compilation`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub album_type: String,
    /// Credited artists.
    #[serde(default, deserialize_with = "null_as_default")]
    pub artists: Vec<ArtistRef>,
    /// Release date at `release_date_precision`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub release_date: String,
    /// `day`, `month` or `year`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub release_date_precision: String,
    /// Number of tracks on the release.
    #[serde(default)]
    pub total_tracks: u32,
}

/// A track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Spotify id (empty for local files).
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Spotify URI.
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri: String,
    /// Track name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Credited artists.
    #[serde(default, deserialize_with = "null_as_default")]
    pub artists: Vec<ArtistRef>,
    /// The album, absent when listed from an album.
    #[serde(default)]
    pub album: Option<AlbumRef>,
    /// Duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
    /// Whether this is a local file.
    #[serde(default)]
    pub is_local: bool,
}

/// An album with (the first page of) its tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    /// Spotify id.
    pub id: String,
    /// Spotify URI.
    pub uri: String,
    /// Album name.
    pub name: String,
    /// `album`, `single` or `compilation`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub album_type: String,
    /// Credited artists.
    #[serde(default, deserialize_with = "null_as_default")]
    pub artists: Vec<ArtistRef>,
    /// Release date at `release_date_precision`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub release_date: String,
    /// `day`, `month` or `year`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub release_date_precision: String,
    /// Number of tracks.
    #[serde(default)]
    pub total_tracks: u32,
    /// Tracks; empty in search results.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tracks: Page<Track>,
}

impl Album {
    /// The reference form of this album, as embedded in tracks.
    #[must_use]
    pub fn to_ref(&self) -> AlbumRef {
        AlbumRef {
            id: self.id.clone(),
            uri: self.uri.clone(),
            name: self.name.clone(),
            album_type: self.album_type.clone(),
            artists: self.artists.clone(),
            release_date: self.release_date.clone(),
            release_date_precision: self.release_date_precision.clone(),
            total_tracks: self.total_tracks,
        }
    }
}

/// An artist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    /// Spotify id.
    pub id: String,
    /// Spotify URI.
    pub uri: String,
    /// Artist name.
    pub name: String,
    /// Genres, when Spotify provides them.
    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<String>,
}

/// A Spotify account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id.
    pub id: String,
    /// Spotify URI.
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri: String,
    /// Display name, if set.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// An entry of a playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    /// When the entry was added.
    #[serde(default)]
    pub added_at: Option<String>,
    /// The track; `None` for unavailable entries.
    #[serde(default)]
    pub track: Option<Track>,
}

/// A playlist with (the first page of) its entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    /// Spotify id.
    pub id: String,
    /// Spotify URI.
    pub uri: String,
    /// Playlist name.
    pub name: String,
    /// Owner of the playlist.
    #[serde(default, deserialize_with = "null_as_default")]
    pub owner: User,
    /// Version identifier of the playlist contents.
    #[serde(default, deserialize_with = "null_as_default")]
    pub snapshot_id: String,
    /// Entries; search results carry only the total.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tracks: Page<PlaylistItem>,
}

/// How long a project is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthClass {
    /// A short release.
    Single,
    /// A full release.
    Album,
}

/// A list of mobs assembled by streamsort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Display name.
    pub name: String,
    /// Contents, possibly nested collections.
    #[serde(default)]
    pub objects: Vec<Mob>,
    /// The release this collection was grouped from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_album: Option<AlbumRef>,
    /// Single/album classification of a project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_class: Option<LengthClass>,
}

impl Collection {
    /// A plain collection with the given contents.
    #[must_use]
    pub fn new(name: impl Into<String>, objects: Vec<Mob>) -> Self {
        Self {
            name: name.into(),
            objects,
            root_album: None,
            length_class: None,
        }
    }
}

/// A music object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Mob {
    /// A track.
    Track(Track),
    /// An album.
    Album(Album),
    /// An artist.
    Artist(Artist),
    /// A playlist.
    Playlist(Playlist),
    /// A user.
    User(User),
    /// A streamsort collection.
    #[serde(rename = "ss")]
    Collection(Collection),
}

impl Mob {
    /// The kind of this mob.
    #[must_use]
    pub fn kind(&self) -> MobKind {
        match self {
            Self::Track(_) => MobKind::Track,
            Self::Album(_) => MobKind::Album,
            Self::Artist(_) => MobKind::Artist,
            Self::Playlist(_) => MobKind::Playlist,
            Self::User(_) => MobKind::User,
            Self::Collection(_) => MobKind::Collection,
        }
    }

    /// Spotify id; empty for collections.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Track(t) => &t.id,
            Self::Album(a) => &a.id,
            Self::Artist(a) => &a.id,
            Self::Playlist(p) => &p.id,
            Self::User(u) => &u.id,
            Self::Collection(_) => "",
        }
    }

    /// Spotify URI; empty for collections.
    #[must_use]
    pub fn uri(&self) -> &str {
        match self {
            Self::Track(t) => &t.uri,
            Self::Album(a) => &a.uri,
            Self::Artist(a) => &a.uri,
            Self::Playlist(p) => &p.uri,
            Self::User(u) => &u.uri,
            Self::Collection(_) => "",
        }
    }

    /// Name, falling back to the id for users without a display name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Track(t) => &t.name,
            Self::Album(a) => &a.name,
            Self::Artist(a) => &a.name,
            Self::Playlist(p) => &p.name,
            Self::User(u) => u.display_name.as_deref().unwrap_or(&u.id),
            Self::Collection(c) => &c.name,
        }
    }

    /// Artists credited on a track or album.
    #[must_use]
    pub fn artists(&self) -> &[ArtistRef] {
        match self {
            Self::Track(t) => &t.artists,
            Self::Album(a) => &a.artists,
            _ => &[],
        }
    }

    /// Whether this mob is a list of tracks (playlist, album or collection).
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self, Self::Playlist(_) | Self::Album(_) | Self::Collection(_))
    }

    /// Playlist contents, if this is a playlist.
    #[must_use]
    pub fn as_playlist(&self) -> Option<&Playlist> {
        match self {
            Self::Playlist(p) => Some(p),
            _ => None,
        }
    }
}

/// Equality of two mobs by URI. Collections are never equal by URI.
#[must_use]
pub fn mob_eq(a: &Mob, b: &Mob) -> bool {
    !a.uri().is_empty() && a.uri() == b.uri()
}

impl fmt::Display for Mob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first_artist = self.artists().first().map_or("", |a| a.name.as_str());
        match self {
            Self::Track(t) => write!(f, "\"{}\" by {first_artist}", t.name),
            Self::Album(a) => write!(f, "*{}* by {first_artist}, {} songs", a.name, a.total_tracks),
            Self::Artist(a) => f.write_str(&a.name),
            Self::Playlist(p) => write!(f, "{}, {} songs", p.name, p.tracks.total),
            Self::User(_) => f.write_str(self.name()),
            Self::Collection(c) => write!(f, "{}, {} items", c.name, c.objects.len()),
        }
    }
}

/// A parsed `spotify:{kind}:{id}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobUri {
    /// Kind of the referenced mob.
    pub kind: MobKind,
    /// Spotify id of the referenced mob.
    pub id: String,
}

impl fmt::Display for MobUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{MOB_URI_PREFIX}{}:{}", self.kind, self.id)
    }
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^https://open\.spotify\.com/(?:intl-[A-Za-z-]+/)?([a-z]+)/([^/?#]*)(?:[/?#].*)?$",
        )
        .expect("URL pattern is valid")
    })
}

/// Recognise a Spotify URI or open.spotify.com URL.
///
/// Returns `None` for anything that is not a reference to a track, album,
/// artist or playlist with an alphanumeric id.
#[must_use]
pub fn as_uri(text: &str) -> Option<MobUri> {
    let text = text.trim();
    let (kind, id) = if text.starts_with(MOB_URL_PREFIX) {
        let caps = url_pattern().captures(text)?;
        (
            caps.get(1).map_or("", |m| m.as_str()),
            caps.get(2).map_or("", |m| m.as_str()),
        )
    } else {
        let mut parts = text.split(':');
        let (Some("spotify"), Some(kind), Some(id), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };
        (kind, id)
    };
    let kind = MobKind::searchable(kind)?;
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(MobUri {
        kind,
        id: id.to_string(),
    })
}

/// The id portion of a URI, URL or bare id.
#[must_use]
pub fn extract_id(link: &str) -> &str {
    let link = link.rsplit(':').next().unwrap_or(link);
    let link = link.rsplit('/').next().unwrap_or(link);
    link.split('?').next().unwrap_or(link)
}

/// Whether the text looks like a Spotify id.
#[must_use]
pub fn is_spid(text: &str) -> bool {
    text.len() == SPID_LEN && text.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn track_json() -> serde_json::Value {
        json!({
            "type": "track",
            "id": "6rqhFgbbKwnb9MLmUQDhG6",
            "uri": "spotify:track:6rqhFgbbKwnb9MLmUQDhG6",
            "name": "Love Me",
            "duration_ms": 215_000,
            "artists": [{"type": "artist", "id": "a1", "uri": "spotify:artist:a1", "name": "JJ Heller"}],
            "album": {
                "type": "album",
                "id": "al1",
                "uri": "spotify:album:al1",
                "name": "Only Love Remains",
                "album_type": "album",
                "release_date": "2009",
                "release_date_precision": "year",
                "total_tracks": 11,
                "artists": [{"id": "a1", "uri": "spotify:artist:a1", "name": "JJ Heller"}]
            }
        })
    }

    #[test]
    fn test_deserialize_track() {
        let mob: Mob = serde_json::from_value(track_json()).unwrap();
        assert_eq!(mob.kind(), MobKind::Track);
        assert_eq!(mob.name(), "Love Me");
        assert_eq!(mob.artists()[0].name, "JJ Heller");
        let Mob::Track(track) = mob else {
            panic!("expected a track")
        };
        assert_eq!(track.album.unwrap().name, "Only Love Remains");
        assert_eq!(track.duration_ms, 215_000);
    }

    #[test]
    fn test_deserialize_local_track_with_nulls() {
        let value = json!({
            "type": "track",
            "id": null,
            "uri": "spotify:local:x:y:z:1",
            "name": "Home Recording",
            "is_local": true,
            "artists": [{"id": null, "uri": null, "name": "Me"}],
            "album": null
        });
        let track: Track = serde_json::from_value(value).unwrap();
        assert!(track.id.is_empty());
        assert!(track.is_local);
        assert!(track.album.is_none());
        assert!(track.artists[0].uri.is_empty());
    }

    #[test]
    fn test_deserialize_search_playlist_without_items() {
        let value = json!({
            "type": "playlist",
            "id": "p1",
            "uri": "spotify:playlist:p1",
            "name": "Star Wars",
            "owner": {"id": "khrpgai88r1q1nr12k4f6r2qz", "display_name": null},
            "tracks": {"href": "https://api.spotify.com/v1/playlists/p1/tracks", "total": 42}
        });
        let mob: Mob = serde_json::from_value(value).unwrap();
        let playlist = mob.as_playlist().unwrap();
        assert_eq!(playlist.tracks.total, 42);
        assert!(playlist.tracks.items.is_empty());
        assert_eq!(playlist.owner.id, "khrpgai88r1q1nr12k4f6r2qz");
        assert_eq!(mob.to_string(), "Star Wars, 42 songs");
    }

    #[test]
    fn test_deserialize_playlist_with_null_item() {
        let value = json!({
            "type": "playlist",
            "id": "p1",
            "uri": "spotify:playlist:p1",
            "name": "Mixed",
            "tracks": {"items": [{"track": null}, {"added_at": "2021-01-01T00:00:00Z", "track": track_json()}], "next": null, "total": 2}
        });
        let playlist: Playlist = serde_json::from_value(value).unwrap();
        assert_eq!(playlist.tracks.items.len(), 2);
        assert!(playlist.tracks.items[0].track.is_none());
        assert!(playlist.tracks.items[1].track.is_some());
    }

    #[test]
    fn test_display_strings() {
        let track: Mob = serde_json::from_value(track_json()).unwrap();
        assert_eq!(track.to_string(), "\"Love Me\" by JJ Heller");

        let album = Mob::Album(Album {
            name: "Only Love Remains".to_string(),
            artists: vec![ArtistRef {
                name: "JJ Heller".to_string(),
                ..ArtistRef::default()
            }],
            total_tracks: 11,
            ..Album::default()
        });
        assert_eq!(album.to_string(), "*Only Love Remains* by JJ Heller, 11 songs");

        let artist = Mob::Artist(Artist {
            name: "JJ Heller".to_string(),
            ..Artist::default()
        });
        assert_eq!(artist.to_string(), "JJ Heller");

        let user = Mob::User(User {
            id: "idm".to_string(),
            ..User::default()
        });
        assert_eq!(user.to_string(), "idm");

        let collection = Mob::Collection(Collection::new("Projects: Mix", vec![track]));
        assert_eq!(collection.to_string(), "Projects: Mix, 1 items");
    }

    #[test]
    fn test_collection_serializes_as_ss() {
        let collection = Mob::Collection(Collection::new("Empty", Vec::new()));
        let value = serde_json::to_value(&collection).unwrap();
        assert_eq!(value["type"], "ss");
        let back: Mob = serde_json::from_value(value).unwrap();
        assert_eq!(back, collection);
    }

    #[test]
    fn test_as_uri_accepts_uri() {
        let uri = as_uri("spotify:album:2up3OPMp9Tb4dAKM2erWXQ").unwrap();
        assert_eq!(uri.kind, MobKind::Album);
        assert_eq!(uri.id, "2up3OPMp9Tb4dAKM2erWXQ");
        assert_eq!(uri.to_string(), "spotify:album:2up3OPMp9Tb4dAKM2erWXQ");
    }

    #[test]
    fn test_as_uri_accepts_url() {
        let uri =
            as_uri("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M?si=abc123").unwrap();
        assert_eq!(uri.kind, MobKind::Playlist);
        assert_eq!(uri.id, "37i9dQZF1DXcBWIGoYBM5M");

        let uri = as_uri("  https://open.spotify.com/intl-de/track/6rqhFgbbKwnb9MLmUQDhG6 ").unwrap();
        assert_eq!(uri.kind, MobKind::Track);
    }

    #[test]
    fn test_as_uri_rejects_non_uris() {
        assert!(as_uri("album:Only Love Remains").is_none());
        assert!(as_uri("spotify:episode:512ojhOuo1ktJprKbVcKyQ").is_none());
        assert!(as_uri("spotify:track:").is_none());
        assert!(as_uri("spotify:track:abc-def").is_none());
        assert!(as_uri("spotify:track:abc:extra").is_none());
        assert!(as_uri("https://open.spotify.com/show/abc").is_none());
        assert!(as_uri("").is_none());
    }

    #[test]
    fn test_extract_id() {
        assert_eq!(extract_id("spotify:track:abc"), "abc");
        assert_eq!(extract_id("https://open.spotify.com/track/abc?si=1"), "abc");
        assert_eq!(extract_id("abc"), "abc");
    }

    #[test]
    fn test_is_spid() {
        assert!(is_spid("6rqhFgbbKwnb9MLmUQDhG6"));
        assert!(!is_spid("6rqhFgbbKwnb9MLmUQDhG"));
        assert!(!is_spid("6rqhFgbbKwnb9MLmUQDh-6"));
    }

    #[test]
    fn test_mob_eq() {
        let a: Mob = serde_json::from_value(track_json()).unwrap();
        let b = a.clone();
        assert!(mob_eq(&a, &b));

        let c1 = Mob::Collection(Collection::new("x", Vec::new()));
        let c2 = c1.clone();
        assert!(!mob_eq(&c1, &c2));
    }

    #[test]
    fn test_mob_kind_names() {
        assert_eq!(MobKind::searchable("playlist"), Some(MobKind::Playlist));
        assert_eq!(MobKind::searchable("user"), None);
        assert_eq!(MobKind::Album.plural(), "albums");
        assert_eq!(MobKind::Collection.to_string(), "ss");
    }
}
