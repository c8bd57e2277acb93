//! The `shuffle` extension.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::debug;

use super::builtin::{create_playlist, reload};
use super::Sentence;
use crate::contain;
use crate::error::{Error, Result};
use crate::mob::Mob;
use crate::search::{open, Query};
use crate::session::Session;
use crate::state::State;

/// `shuffle`: write a list into a playlist in random order.
///
/// With no query the subject is shuffled into a new playlist. With a query
/// the query is shuffled into the subject, replacing its tracks.
#[derive(Debug, Clone, Copy)]
pub struct Shuffle;

/// The objects a list is shuffled by. Collections keep their members whole.
async fn top_level(session: &Session, source: &Mob) -> Result<Vec<Mob>> {
    match source {
        Mob::Collection(collection) => Ok(collection.objects.clone()),
        _ => Ok(contain::tracks(session.service(), source)
            .await?
            .into_iter()
            .map(Mob::Track)
            .collect()),
    }
}

/// The track URIs of `source` with its top-level objects in random order.
async fn shuffled_uris(session: &Session, source: &Mob) -> Result<Vec<String>> {
    let mut objects = top_level(session, source).await?;
    objects.shuffle(&mut rand::rng());
    let mut uris = Vec::new();
    for object in &objects {
        uris.extend(contain::track_uris(session.service(), object).await?);
    }
    Ok(uris)
}

#[async_trait]
impl Sentence for Shuffle {
    async fn run(&self, session: &Session, subject: &State, query: Query) -> Result<State> {
        let into_new = query.is_empty();
        let source = if into_new {
            subject.mob.clone()
        } else {
            if subject.mob.as_playlist().is_none() {
                return Err(Error::unsupported_verb(subject.mob.to_string(), "shuffle"));
            }
            open(session, &subject.mob, query).await?
        };
        if !source.is_list() {
            return Err(Error::unsupported_query("shuffle", source.to_string()));
        }

        // Read everything before creating a playlist so a failed read leaves none behind.
        let uris = shuffled_uris(session, &source).await?;
        let destination = if into_new {
            create_playlist(session, subject, &format!("Shuffled: {}", source.name())).await?
        } else {
            subject.clone()
        };
        let Some(playlist) = destination.mob.as_playlist() else {
            return Err(Error::unsupported_verb(destination.mob.to_string(), "shuffle"));
        };

        let existing = contain::track_uris(session.service(), &destination.mob).await?;
        debug!(playlist = %playlist.id, removed = existing.len(), added = uris.len(), "Shuffling");
        if !existing.is_empty() {
            session.service().remove_all_items(&playlist.id, &existing).await?;
        }
        session.service().add_items(&playlist.id, &uris).await?;
        reload(session, &destination, &playlist.id).await
    }
}
