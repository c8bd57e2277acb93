//! The built-in sentences.

use async_trait::async_trait;
use tracing::{debug, info};

use super::Sentence;
use crate::api::{collect_pages, PlaybackRequest};
use crate::contain::{self, Contents};
use crate::error::{Error, Result};
use crate::mob::{Collection, Mob, MobKind, Playlist};
use crate::search::{open, Query};
use crate::session::Session;
use crate::state::State;

/// Name given to playlists created without one.
pub const DEFAULT_PLAYLIST_NAME: &str = "New Playlist";

/// The query resolved against the subject, or the subject itself if empty.
pub(crate) async fn query_or_subject(session: &Session, subject: &State, query: Query) -> Result<Mob> {
    if query.is_empty() {
        Ok(subject.mob.clone())
    } else {
        open(session, &subject.mob, query).await
    }
}

/// The subject as a playlist, or an error naming `verb`.
fn editable<'a>(subject: &'a State, verb: &str) -> Result<&'a Playlist> {
    subject
        .mob
        .as_playlist()
        .ok_or_else(|| Error::unsupported_verb(subject.mob.to_string(), verb))
}

/// Re-fetch a playlist after editing it.
pub(crate) async fn reload(session: &Session, subject: &State, playlist_id: &str) -> Result<State> {
    let mob = session
        .service()
        .fetch(MobKind::Playlist, playlist_id)
        .await?;
    Ok(subject.with_mob(mob))
}

/// Create a playlist owned by the user and make it the subject.
pub(crate) async fn create_playlist(session: &Session, subject: &State, name: &str) -> Result<State> {
    let playlist = session
        .service()
        .create_playlist(&session.user().id, name)
        .await?;
    info!("Created playlist {} ({})", playlist.name, playlist.id);
    Ok(subject.with_mob(Mob::Playlist(playlist)))
}

/// `open`/`get`: make the query the subject.
#[derive(Debug, Clone, Copy)]
pub struct Open;

#[async_trait]
impl Sentence for Open {
    async fn run(&self, session: &Session, subject: &State, query: Query) -> Result<State> {
        let mob = open(session, &subject.mob, query).await?;
        Ok(subject.with_mob(mob))
    }
}

/// `add`: append every track of the query to the subject playlist.
#[derive(Debug, Clone, Copy)]
pub struct Add;

#[async_trait]
impl Sentence for Add {
    async fn run(&self, session: &Session, subject: &State, query: Query) -> Result<State> {
        let playlist = editable(subject, "add")?;
        let target = open(session, &subject.mob, query).await?;
        if target.kind() == MobKind::Artist {
            return Err(Error::unsupported_query("add", target.to_string()));
        }
        let uris = contain::track_uris(session.service(), &target).await?;
        debug!(playlist = %playlist.id, count = uris.len(), "Adding tracks");
        session.service().add_items(&playlist.id, &uris).await?;
        reload(session, subject, &playlist.id).await
    }
}

/// `remove`: remove every occurrence of the query's tracks from the subject.
#[derive(Debug, Clone, Copy)]
pub struct Remove;

#[async_trait]
impl Sentence for Remove {
    async fn run(&self, session: &Session, subject: &State, query: Query) -> Result<State> {
        let playlist = editable(subject, "remove")?;
        let target = open(session, &subject.mob, query).await?;
        if target.kind() == MobKind::Artist {
            return Err(Error::unsupported_query("remove", target.to_string()));
        }
        let uris = contain::track_uris(session.service(), &target).await?;
        debug!(playlist = %playlist.id, count = uris.len(), "Removing tracks");
        session.service().remove_all_items(&playlist.id, &uris).await?;
        reload(session, subject, &playlist.id).await
    }
}

/// `play`: start playback of the query, inside the subject when it holds it.
#[derive(Debug, Clone, Copy)]
pub struct Play;

impl Play {
    /// Playback of the subject starting at the first of its tracks in `target`.
    async fn in_context(session: &Session, context: &Mob, target: &Mob) -> Result<Option<PlaybackRequest>> {
        if context.uri().is_empty() || matches!(context.kind(), MobKind::Track | MobKind::Artist) {
            return Ok(None);
        }
        let context_contents = Contents::of(session.service(), context).await?;
        if !context_contents.contains(session.service(), target).await? {
            return Ok(None);
        }
        let target_contents = Contents::of(session.service(), target).await?;
        for track in context_contents.tracks() {
            let track = Mob::Track(track.clone());
            if target_contents.contains(session.service(), &track).await? {
                return Ok(Some(PlaybackRequest::Context {
                    context_uri: context.uri().to_string(),
                    offset: Some(track.uri().to_string()),
                }));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Sentence for Play {
    async fn run(&self, session: &Session, subject: &State, query: Query) -> Result<State> {
        let target = open(session, &subject.mob, query).await?;
        let request = match Self::in_context(session, &subject.mob, &target).await? {
            Some(request) => request,
            None => match &target {
                Mob::Album(_) | Mob::Artist(_) | Mob::Playlist(_) => PlaybackRequest::Context {
                    context_uri: target.uri().to_string(),
                    offset: None,
                },
                Mob::Track(_) | Mob::Collection(_) => {
                    PlaybackRequest::Uris(contain::track_uris(session.service(), &target).await?)
                }
                Mob::User(_) => return Err(Error::unsupported_query("play", target.to_string())),
            },
        };
        debug!(?request, "Starting playback");
        session.service().start_playback(&request).await?;
        Ok(subject.clone())
    }
}

/// `all`: the full contents of the query (or subject) as a collection.
#[derive(Debug, Clone, Copy)]
pub struct All;

#[async_trait]
impl Sentence for All {
    async fn run(&self, session: &Session, subject: &State, query: Query) -> Result<State> {
        let source = query_or_subject(session, subject, query).await?;
        let tracks = match &source {
            Mob::Artist(artist) => {
                let first = session.service().artist_albums(&artist.id).await?;
                let mut tracks = Vec::new();
                for album in collect_pages(session.service(), &first).await? {
                    let full = session.service().fetch(MobKind::Album, &album.id).await?;
                    tracks.extend(contain::tracks(session.service(), &full).await?);
                }
                tracks
            }
            Mob::User(_) => return Err(Error::unsupported_query("all", source.to_string())),
            _ => contain::tracks(session.service(), &source).await?,
        };
        let collection = Collection::new(
            format!("All: {}", source.name()),
            tracks.into_iter().map(Mob::Track).collect(),
        );
        Ok(subject.with_mob(Mob::Collection(collection)))
    }
}

/// `new`: create a playlist and make it the subject.
#[derive(Debug, Clone, Copy)]
pub struct New;

#[async_trait]
impl Sentence for New {
    async fn run(&self, session: &Session, subject: &State, query: Query) -> Result<State> {
        let name = match &query {
            Query::Text(text) if text.trim().is_empty() => DEFAULT_PLAYLIST_NAME.to_string(),
            Query::Text(text) => text.trim().to_string(),
            Query::Mob(mob) => mob.name().to_string(),
        };
        create_playlist(session, subject, &name).await
    }
}

/// `backup`: store the query (or subject) playlist in the catalog.
#[derive(Debug, Clone, Copy)]
pub struct Backup;

#[async_trait]
impl Sentence for Backup {
    async fn run(&self, session: &Session, subject: &State, query: Query) -> Result<State> {
        let target = query_or_subject(session, subject, query).await?;
        let Mob::Playlist(playlist) = &target else {
            return Err(Error::unsupported_query("backup", target.to_string()));
        };
        let tracks = contain::tracks(session.service(), &target).await?;
        let snapshot = session.with_catalog_locked(|catalog| catalog.backup(playlist, &tracks))?;
        match snapshot {
            Some(id) => session.notify(&format!("Backed up {target} as snapshot {id}")),
            None => session.notify(&format!("{target} is unchanged since the last backup")),
        }
        Ok(subject.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeService;
    use crate::contain::fixtures::{album, artist, collection, playlist, track, track_in};
    use crate::interaction::scripted::ScriptedInteraction;
    use crate::session::testing::session;
    use std::sync::Arc;

    async fn setup() -> (Arc<FakeService>, Arc<ScriptedInteraction>, Session) {
        let service = Arc::new(FakeService::new());
        let io = Arc::new(ScriptedInteraction::default());
        let session = session(service.clone(), io.clone()).await;
        (service, io, session)
    }

    fn state(mob: Mob) -> State {
        State::new(mob)
    }

    #[tokio::test]
    async fn test_open_keeps_subshells() {
        let (service, _io, session) = setup().await;
        service.insert(artist("a"));
        let subject = state(Mob::User(service.user())).with_subshell("x", state(artist("z")));

        let next = Open
            .run(&session, &subject, Query::from("spotify:artist:a"))
            .await
            .unwrap();
        assert_eq!(next.mob.id(), "a");
        assert!(next.subshell("x").is_some());
    }

    #[tokio::test]
    async fn test_add_requires_playlist_subject() {
        let (service, _io, session) = setup().await;
        let subject = state(Mob::User(service.user()));
        let err = Add
            .run(&session, &subject, Query::Mob(Mob::Track(track("a"))))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedVerb { ref verb, .. } if verb == "add"));
    }

    #[tokio::test]
    async fn test_add_rejects_artist_query() {
        let (service, _io, session) = setup().await;
        let list = playlist("p", "me", Vec::new());
        service.insert(Mob::Playlist(list.clone()));
        let err = Add
            .run(&session, &state(Mob::Playlist(list)), Query::Mob(artist("a")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedQuery { .. }));
    }

    #[tokio::test]
    async fn test_add_and_remove_tracks() {
        let (service, _io, session) = setup().await;
        let list = playlist("p", "me", vec![track("a")]);
        service.insert(Mob::Playlist(list.clone()));
        let source = Mob::Album(album("al", "ar", vec![track("b"), track("c")]));

        let after_add = Add
            .run(&session, &state(Mob::Playlist(list)), Query::Mob(source))
            .await
            .unwrap();
        assert_eq!(
            service.playlist_uris("p"),
            vec!["spotify:track:a", "spotify:track:b", "spotify:track:c"]
        );
        assert_eq!(after_add.mob.as_playlist().unwrap().tracks.total, 3);

        let after_remove = Remove
            .run(&session, &after_add, Query::Mob(Mob::Track(track("b"))))
            .await
            .unwrap();
        assert_eq!(service.playlist_uris("p"), vec!["spotify:track:a", "spotify:track:c"]);
        assert_eq!(after_remove.mob.as_playlist().unwrap().tracks.total, 2);
    }

    #[tokio::test]
    async fn test_play_in_context() {
        let (service, _io, session) = setup().await;
        let list = Mob::Playlist(playlist("p", "me", vec![track("a"), track("b"), track("c")]));
        let subject = state(list);

        Play.run(&session, &subject, Query::Mob(Mob::Track(track("b"))))
            .await
            .unwrap();
        let playback = service.playback.lock().unwrap().clone();
        assert_eq!(
            playback,
            vec![PlaybackRequest::Context {
                context_uri: "spotify:playlist:p".to_string(),
                offset: Some("spotify:track:b".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn test_play_outside_context() {
        let (service, _io, session) = setup().await;
        let subject = state(Mob::User(service.user()));

        Play.run(&session, &subject, Query::Mob(Mob::Track(track("a"))))
            .await
            .unwrap();
        Play.run(&session, &subject, Query::Mob(Mob::Album(album("al", "ar", Vec::new()))))
            .await
            .unwrap();
        let playback = service.playback.lock().unwrap().clone();
        assert_eq!(
            playback,
            vec![
                PlaybackRequest::Uris(vec!["spotify:track:a".to_string()]),
                PlaybackRequest::Context {
                    context_uri: "spotify:album:al".to_string(),
                    offset: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_all_of_subject_playlist() {
        let (_service, _io, session) = setup().await;
        let list = playlist("p", "me", vec![track("a"), track("b")]);
        let subject = state(Mob::Playlist(list));

        let next = All.run(&session, &subject, Query::from("")).await.unwrap();
        let Mob::Collection(all) = &next.mob else {
            panic!("expected a collection");
        };
        assert_eq!(all.name, "All: Playlist p");
        assert_eq!(all.objects.len(), 2);
        assert_eq!(next.mob.to_string(), "All: Playlist p, 2 items");
    }

    #[tokio::test]
    async fn test_all_of_artist_walks_albums() {
        let (service, _io, session) = setup().await;
        let first = album("one", "ar", vec![track("a")]);
        let second = album("two", "ar", vec![track("b"), track("c")]);
        service.insert(Mob::Album(first.clone()));
        service.insert(Mob::Album(second.clone()));
        service.set_artist_albums("ar", vec![first, second]);

        let next = All
            .run(&session, &state(Mob::User(service.user())), Query::Mob(artist("ar")))
            .await
            .unwrap();
        let uris = contain::track_uris(session.service(), &next.mob).await.unwrap();
        assert_eq!(uris, vec!["spotify:track:a", "spotify:track:b", "spotify:track:c"]);
    }

    #[tokio::test]
    async fn test_new_playlist_names() {
        let (service, _io, session) = setup().await;
        let subject = state(Mob::User(service.user()));

        let unnamed = New.run(&session, &subject, Query::from("")).await.unwrap();
        assert_eq!(unnamed.mob.name(), DEFAULT_PLAYLIST_NAME);

        let named = New.run(&session, &subject, Query::from("Road Trip")).await.unwrap();
        assert_eq!(named.mob.name(), "Road Trip");
        assert_eq!(named.mob.as_playlist().unwrap().owner.id, "me");
    }

    #[tokio::test]
    async fn test_backup_records_once() {
        let (_service, io, session) = setup().await;
        let list = Mob::Playlist(playlist("p", "me", vec![track_in("a", "al", "ar")]));
        let subject = state(list);

        Backup.run(&session, &subject, Query::from("")).await.unwrap();
        Backup.run(&session, &subject, Query::from("")).await.unwrap();

        let notices = io.notices();
        assert!(notices[0].starts_with("Backed up Playlist p"));
        assert_eq!(notices[1], "Playlist p, 1 songs is unchanged since the last backup");
    }

    #[tokio::test]
    async fn test_backup_rejects_non_playlist() {
        let (_service, _io, session) = setup().await;
        let subject = state(collection("c", Vec::new()));
        let err = Backup.run(&session, &subject, Query::from("")).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedQuery { .. }));
    }
}
