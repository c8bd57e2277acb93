//! Membership: which tracks a mob holds and whether one mob is in another.

use futures::future::{BoxFuture, FutureExt};

use crate::api::{collect_pages, MusicService};
use crate::error::Result;
use crate::mob::{Mob, MobKind, Track};

/// Every track of a mob, following pagination.
///
/// Playlists skip unavailable entries, album tracks get their album filled
/// in, collections are flattened recursively. Artists and users hold no
/// tracks.
pub fn tracks<'a>(service: &'a dyn MusicService, mob: &'a Mob) -> BoxFuture<'a, Result<Vec<Track>>> {
    async move {
        let tracks = match mob {
            Mob::Track(track) => vec![track.clone()],
            Mob::Playlist(playlist) => collect_pages(service, &playlist.tracks)
                .await?
                .into_iter()
                .filter_map(|item| item.track)
                .collect(),
            Mob::Album(album) => {
                let album_ref = album.to_ref();
                collect_pages(service, &album.tracks)
                    .await?
                    .into_iter()
                    .map(|mut track| {
                        track.album.get_or_insert_with(|| album_ref.clone());
                        track
                    })
                    .collect()
            }
            Mob::Collection(collection) => {
                let mut all = Vec::new();
                for object in &collection.objects {
                    all.extend(tracks(service, object).await?);
                }
                all
            }
            Mob::Artist(_) | Mob::User(_) => Vec::new(),
        };
        Ok(tracks)
    }
    .boxed()
}

/// Playable URIs of a mob, in order.
///
/// # Errors
///
/// Returns an error if a page of tracks cannot be fetched.
pub async fn track_uris(service: &dyn MusicService, mob: &Mob) -> Result<Vec<String>> {
    Ok(tracks(service, mob)
        .await?
        .into_iter()
        .map(|t| t.uri)
        .collect())
}

/// Whether `needle` occurs as a contiguous run in `haystack`.
#[must_use]
pub fn contains_run<T: PartialEq>(haystack: &[T], needle: &[T]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// A container with its tracks loaded, for repeated membership checks.
#[derive(Debug, Clone)]
pub struct Contents {
    kind: MobKind,
    uri: String,
    tracks: Vec<Track>,
}

impl Contents {
    /// Load the tracks of `container`.
    ///
    /// # Errors
    ///
    /// Returns an error if a page of tracks cannot be fetched.
    pub async fn of(service: &dyn MusicService, container: &Mob) -> Result<Self> {
        Ok(Self {
            kind: container.kind(),
            uri: container.uri().to_string(),
            tracks: tracks(service, container).await?,
        })
    }

    /// The loaded tracks.
    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn is_list(&self) -> bool {
        matches!(
            self.kind,
            MobKind::Album | MobKind::Playlist | MobKind::Collection
        )
    }

    fn credits(&self, artist_uri: &str) -> bool {
        self.tracks
            .iter()
            .any(|t| t.artists.iter().any(|a| a.uri == artist_uri))
    }

    /// Whether `obj` is in this container. Never fails for unrelated kinds.
    ///
    /// # Errors
    ///
    /// Returns an error if the tracks of a playlist `obj` cannot be fetched.
    pub async fn contains(&self, service: &dyn MusicService, obj: &Mob) -> Result<bool> {
        if !obj.uri().is_empty() && obj.uri() == self.uri {
            return Ok(true);
        }
        let found = match (obj, self.kind) {
            (Mob::Track(track), MobKind::Artist) => {
                track.artists.iter().any(|a| a.uri == self.uri)
            }
            (Mob::Track(track), _) if self.is_list() => {
                self.tracks.iter().any(|t| t.uri == track.uri)
            }
            (Mob::Album(album), MobKind::Artist) => {
                album.artists.iter().any(|a| a.uri == self.uri)
            }
            (Mob::Album(album), MobKind::Playlist | MobKind::Collection) => self
                .tracks
                .iter()
                .any(|t| t.album.as_ref().is_some_and(|a| a.uri == album.uri)),
            (Mob::Artist(artist), MobKind::Track) => self.credits(&artist.uri),
            (Mob::Artist(artist), _) if self.is_list() => self.credits(&artist.uri),
            (Mob::Playlist(_), MobKind::Playlist | MobKind::Collection) => {
                let needle: Vec<String> = track_uris(service, obj).await?;
                let haystack: Vec<&str> = self.tracks.iter().map(|t| t.uri.as_str()).collect();
                let needle: Vec<&str> = needle.iter().map(String::as_str).collect();
                contains_run(&haystack, &needle)
            }
            _ => false,
        };
        Ok(found)
    }
}

/// Whether `obj` is in `container`.
///
/// # Errors
///
/// Returns an error if tracks cannot be fetched.
pub async fn mob_in_mob(service: &dyn MusicService, obj: &Mob, container: &Mob) -> Result<bool> {
    Contents::of(service, container)
        .await?
        .contains(service, obj)
        .await
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small mobs shared by tests across the crate.

    use crate::mob::{
        Album, AlbumRef, Artist, ArtistRef, Collection, Mob, Page, Playlist, PlaylistItem, Track,
        User,
    };

    pub fn artist_ref(id: &str) -> ArtistRef {
        ArtistRef {
            id: id.to_string(),
            uri: format!("spotify:artist:{id}"),
            name: format!("Artist {id}"),
        }
    }

    pub fn artist(id: &str) -> Mob {
        Mob::Artist(Artist {
            id: id.to_string(),
            uri: format!("spotify:artist:{id}"),
            name: format!("Artist {id}"),
            genres: Vec::new(),
        })
    }

    pub fn album_ref(id: &str, artist: &str) -> AlbumRef {
        AlbumRef {
            id: id.to_string(),
            uri: format!("spotify:album:{id}"),
            name: format!("Album {id}"),
            album_type: "album".to_string(),
            artists: vec![artist_ref(artist)],
            ..AlbumRef::default()
        }
    }

    pub fn track_in(id: &str, album: &str, artist: &str) -> Track {
        Track {
            id: id.to_string(),
            uri: format!("spotify:track:{id}"),
            name: format!("Song {id}"),
            artists: vec![artist_ref(artist)],
            album: Some(album_ref(album, artist)),
            duration_ms: 200_000,
            is_local: false,
        }
    }

    pub fn track(id: &str) -> Track {
        track_in(id, "al", "ar")
    }

    pub fn album(id: &str, artist: &str, tracks: Vec<Track>) -> Album {
        let tracks: Vec<Track> = tracks
            .into_iter()
            .map(|mut t| {
                t.album = None;
                t
            })
            .collect();
        Album {
            id: id.to_string(),
            uri: format!("spotify:album:{id}"),
            name: format!("Album {id}"),
            album_type: "album".to_string(),
            artists: vec![artist_ref(artist)],
            total_tracks: u32::try_from(tracks.len()).unwrap(),
            tracks: Page::complete(tracks),
            ..Album::default()
        }
    }

    pub fn playlist(id: &str, owner: &str, tracks: Vec<Track>) -> Playlist {
        Playlist {
            id: id.to_string(),
            uri: format!("spotify:playlist:{id}"),
            name: format!("Playlist {id}"),
            owner: User {
                id: owner.to_string(),
                ..User::default()
            },
            snapshot_id: "snap".to_string(),
            tracks: Page::complete(
                tracks
                    .into_iter()
                    .map(|t| PlaylistItem {
                        added_at: None,
                        track: Some(t),
                    })
                    .collect(),
            ),
        }
    }

    pub fn collection(name: &str, objects: Vec<Mob>) -> Mob {
        Mob::Collection(Collection::new(name, objects))
    }
}
