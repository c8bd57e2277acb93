//! Resolving a query to a mob.
//!
//! Text queries go to Spotify search. Results are ranked in tiers of
//! familiarity to the user, and the user is asked to confirm picks the
//! search is unsure about.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::contain::Contents;
use crate::error::{Error, Result};
use crate::mob::{as_uri, Mob, MobKind};
use crate::session::Session;

/// Notice shown when a search selects nothing.
pub const NO_RESULTS_NOTICE: &str = "Search returned no results";

/// Tiers for tracks, albums and artists.
const KIND_TIERS: usize = 5;

/// Tiers for playlists.
const PLAYLIST_TIERS: usize = 4;

/// Tiers below this take a lone candidate without asking.
const CONFIDENT_TIERS: usize = 3;

/// What a sentence acts on: text to search for, or a resolved mob.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Words typed by the user.
    Text(String),
    /// A mob produced by another line.
    Mob(Mob),
}

impl Query {
    /// Whether this is empty text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(text) if text.trim().is_empty())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Mob(mob) => write!(f, "{mob}"),
        }
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Mob> for Query {
    fn from(mob: Mob) -> Self {
        Self::Mob(mob)
    }
}

/// How a tier with several candidates is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Take the first candidate.
    FirstResult,
    /// Ask the user about candidates in turn.
    Confirm,
}

/// Resolve `query` against `subject`.
///
/// A mob query is returned as is; text is searched for.
///
/// # Errors
///
/// Returns [`Error::NoResults`] if nothing was selected, or an error from
/// Spotify.
pub async fn open(session: &Session, subject: &Mob, query: Query) -> Result<Mob> {
    let text = match query {
        Query::Mob(mob) => return Ok(mob),
        Query::Text(text) => text,
    };
    let found = if text.trim().is_empty() {
        None
    } else {
        Search::new(session, subject).run(text.trim()).await?
    };
    found.ok_or_else(|| {
        session.notify(NO_RESULTS_NOTICE);
        Error::NoResults
    })
}

/// Merge lists by taking one item from each in turn.
fn round_robin(lists: Vec<Vec<Mob>>) -> Vec<Mob> {
    let mut iters: Vec<_> = lists.into_iter().map(Vec::into_iter).collect();
    let mut merged = Vec::new();
    loop {
        let before = merged.len();
        for iter in &mut iters {
            if let Some(item) = iter.next() {
                merged.push(item);
            }
        }
        if merged.len() == before {
            return merged;
        }
    }
}

/// Artist ids associated with a result; an artist is associated with itself.
fn artist_ids(mob: &Mob) -> Vec<&str> {
    match mob {
        Mob::Artist(artist) => vec![artist.id.as_str()],
        _ => mob
            .artists()
            .iter()
            .map(|a| a.id.as_str())
            .filter(|id| !id.is_empty())
            .collect(),
    }
}

/// Whether one name starts with the other, ignoring case.
fn names_match(name: &str, query: &str) -> bool {
    let name = name.to_lowercase();
    let query = query.to_lowercase();
    name.starts_with(&query) || query.starts_with(&name)
}

struct Search<'a> {
    session: &'a Session,
    subject: &'a Mob,
    contents: Option<Contents>,
    following: HashMap<String, bool>,
    declined: HashSet<String>,
}

impl<'a> Search<'a> {
    fn new(session: &'a Session, subject: &'a Mob) -> Self {
        Self {
            session,
            subject,
            contents: None,
            following: HashMap::new(),
            declined: HashSet::new(),
        }
    }

    async fn run(&mut self, text: &str) -> Result<Option<Mob>> {
        if let Some(uri) = as_uri(text) {
            debug!("Opening {uri} directly");
            return self.session.service().fetch(uri.kind, &uri.id).await.map(Some);
        }
        let has = |tag: &str| text.contains(&format!("{tag}:"));
        if has("playlist") {
            self.playlist(text).await
        } else if has("track") && (has("album") || has("artist")) {
            self.by_kind(text, MobKind::Track, Mode::FirstResult).await
        } else if has("track") {
            self.by_kind(text, MobKind::Track, Mode::Confirm).await
        } else if has("album") && has("artist") {
            self.by_kind(text, MobKind::Album, Mode::FirstResult).await
        } else if has("album") {
            self.by_kind(text, MobKind::Album, Mode::Confirm).await
        } else if has("artist") {
            self.by_kind(text, MobKind::Artist, Mode::FirstResult).await
        } else {
            self.general(text).await
        }
    }

    async fn search(&self, text: &str, kinds: &[MobKind]) -> Result<crate::api::SearchResults> {
        let limit = self.session.search_config().limit;
        debug!(query = text, ?kinds, limit, "Searching");
        self.session.service().search(text, kinds, limit).await
    }

    async fn full(&self, mob: &Mob) -> Result<Mob> {
        self.session.service().fetch(mob.kind(), mob.id()).await
    }

    fn using(&self, mob: &Mob) {
        self.session.notify(&format!("Using {mob}"));
    }

    /// Settle a non-empty tier according to `mode`.
    fn choose(&mut self, mode: Mode, candidates: &[Mob]) -> Option<Mob> {
        match mode {
            Mode::FirstResult => {
                let first = candidates.first()?;
                self.using(first);
                Some(first.clone())
            }
            Mode::Confirm => {
                let limit = self.session.search_config().suggestions;
                let mut asked = 0;
                for candidate in candidates {
                    if self.declined.contains(candidate.uri()) {
                        continue;
                    }
                    if asked == limit {
                        break;
                    }
                    asked += 1;
                    if self.session.confirm(&format!("Continue with {candidate}?")) {
                        return Some(candidate.clone());
                    }
                    self.declined.insert(candidate.uri().to_string());
                }
                None
            }
        }
    }

    async fn contained(&mut self, items: &[Mob]) -> Result<Vec<Mob>> {
        if self.contents.is_none() {
            self.contents = Some(Contents::of(self.session.service(), self.subject).await?);
        }
        let Some(contents) = self.contents.as_ref() else {
            return Ok(Vec::new());
        };
        let mut found = Vec::new();
        for item in items {
            if contents.contains(self.session.service(), item).await? {
                found.push(item.clone());
            }
        }
        Ok(found)
    }

    async fn followed(&mut self, items: &[Mob]) -> Result<Vec<Mob>> {
        let mut unknown: Vec<String> = items
            .iter()
            .flat_map(artist_ids)
            .filter(|id| !self.following.contains_key(*id))
            .map(str::to_string)
            .collect();
        unknown.sort();
        unknown.dedup();
        if !unknown.is_empty() {
            let answers = self.session.service().following_artists(&unknown).await?;
            self.following.extend(unknown.into_iter().zip(answers));
        }
        Ok(items
            .iter()
            .filter(|item| {
                artist_ids(item)
                    .iter()
                    .any(|id| self.following.get(*id).copied().unwrap_or(false))
            })
            .cloned()
            .collect())
    }

    /// Candidates of a track, album or artist tier.
    async fn kind_tier(&mut self, kind: MobKind, items: &[Mob], tier: usize) -> Result<Vec<Mob>> {
        match tier {
            0 => self.contained(items).await,
            1 => self.followed(items).await,
            2 => {
                let liked = self.session.liked().await?;
                Ok(items
                    .iter()
                    .filter(|item| liked.contains(kind, item.id()))
                    .cloned()
                    .collect())
            }
            3 => {
                let liked = self.session.liked().await?;
                Ok(items
                    .iter()
                    .filter(|item| {
                        artist_ids(item)
                            .iter()
                            .any(|id| liked.contains(MobKind::Artist, id))
                    })
                    .cloned()
                    .collect())
            }
            _ => Ok(items.to_vec()),
        }
    }

    /// Candidates of a playlist tier.
    async fn playlist_tier(&self, items: &[Mob], tier: usize) -> Result<Vec<Mob>> {
        let user = &self.session.user().id;
        match tier {
            0 => Ok(items
                .iter()
                .filter(|p| !p.id().is_empty() && p.id() == self.subject.id())
                .cloned()
                .collect()),
            1 => Ok(items
                .iter()
                .filter(|p| p.as_playlist().is_some_and(|p| &p.owner.id == user))
                .cloned()
                .collect()),
            2 => {
                let mut followed = Vec::new();
                for item in items {
                    if self
                        .session
                        .service()
                        .following_playlist(item.id(), user)
                        .await?
                    {
                        followed.push(item.clone());
                    }
                }
                Ok(followed)
            }
            _ => Ok(items.to_vec()),
        }
    }

    async fn by_kind(&mut self, text: &str, kind: MobKind, mode: Mode) -> Result<Option<Mob>> {
        let results = self.search(text, &[kind]).await?;
        let items = results.items(kind).to_vec();
        for tier in 0..KIND_TIERS {
            let candidates = self.kind_tier(kind, &items, tier).await?;
            debug!(%kind, tier, candidates = candidates.len(), "Search tier");
            let chosen = match candidates.as_slice() {
                [] => None,
                [only] if tier < CONFIDENT_TIERS => Some(only.clone()),
                _ => self.choose(mode, &candidates),
            };
            if let Some(mob) = chosen {
                return if kind == MobKind::Album {
                    self.full(&mob).await.map(Some)
                } else {
                    Ok(Some(mob))
                };
            }
        }
        Ok(None)
    }

    async fn playlist(&mut self, text: &str) -> Result<Option<Mob>> {
        let results = self.search(text, &[MobKind::Playlist]).await?;
        let items = results.items(MobKind::Playlist).to_vec();

        if let Some(first) = self.playlist_tier(&items, 0).await?.first() {
            self.using(first);
            return self.full(first).await.map(Some);
        }

        let owned = self.playlist_tier(&items, 1).await?;
        let name = text.replace("playlist:", "");
        if let Some(named) = owned.iter().find(|p| names_match(p.name(), name.trim())) {
            self.using(named);
            return self.full(named).await.map(Some);
        }
        if !owned.is_empty() {
            if let Some(chosen) = self.choose(Mode::Confirm, &owned) {
                return self.full(&chosen).await.map(Some);
            }
        }

        for tier in 2..PLAYLIST_TIERS {
            let candidates = self.playlist_tier(&items, tier).await?;
            if let Some(chosen) = self.settle(&candidates) {
                return self.full(&chosen).await.map(Some);
            }
        }
        Ok(None)
    }

    /// A lone candidate is taken; several are confirmed.
    fn settle(&mut self, candidates: &[Mob]) -> Option<Mob> {
        match candidates {
            [] => None,
            [only] => {
                self.using(only);
                Some(only.clone())
            }
            _ => self.choose(Mode::Confirm, candidates),
        }
    }

    async fn general(&mut self, text: &str) -> Result<Option<Mob>> {
        let results = self.search(text, &MobKind::SEARCHABLE).await?;
        let grouped = [MobKind::Track, MobKind::Album, MobKind::Artist];
        let playlists = results.items(MobKind::Playlist).to_vec();

        for round in 0..KIND_TIERS {
            let mut lists = Vec::with_capacity(grouped.len());
            for kind in grouped {
                let items = results.items(kind).to_vec();
                lists.push(self.kind_tier(kind, &items, round).await?);
            }
            if let Some(chosen) = self.settle(&round_robin(lists)) {
                return self.full(&chosen).await.map(Some);
            }

            if round < PLAYLIST_TIERS {
                let candidates = self.playlist_tier(&playlists, round).await?;
                if let Some(chosen) = self.settle(&candidates) {
                    return self.full(&chosen).await.map(Some);
                }
            }
        }
        Ok(None)
    }
}
