//! The `projects` extension: a list grouped into releases.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use super::builtin::query_or_subject;
use super::Sentence;
use crate::contain;
use crate::error::{Error, Result};
use crate::mob::{AlbumRef, Collection, LengthClass, Mob, MobKind, Track};
use crate::search::Query;
use crate::session::Session;
use crate::state::State;

/// Shown before grouping, which fetches every repeated album.
pub const SLOW_NOTICE: &str = "    NOTE: \"projects\" may take a while";

/// Most tracks a single may have.
pub const SINGLE_MAX_TRACKS: usize = 3;

/// Longest a single may run, in milliseconds.
pub const SINGLE_MAX_DURATION_MS: u64 = 30 * 60 * 1000;

/// `projects`: group the tracks of a list by the release they come from.
#[derive(Debug, Clone, Copy)]
pub struct Projects;

#[derive(Debug)]
struct Project {
    key: String,
    album: Option<AlbumRef>,
    name: String,
    tracks: Vec<Track>,
}

impl Project {
    fn has_duplicates(&self) -> bool {
        let mut seen = HashSet::new();
        !self.tracks.iter().all(|t| seen.insert(t.uri.as_str()))
    }

    fn length_class(&self) -> LengthClass {
        let duration: u64 = self.tracks.iter().map(|t| t.duration_ms).sum();
        if self.tracks.len() <= SINGLE_MAX_TRACKS && duration <= SINGLE_MAX_DURATION_MS {
            LengthClass::Single
        } else {
            LengthClass::Album
        }
    }
}

/// Group tracks by album, keeping the order albums are first seen in.
fn group(tracks: Vec<Track>) -> Vec<Project> {
    let mut projects: Vec<Project> = Vec::new();
    for track in tracks {
        let (key, name) = match &track.album {
            Some(album) if !album.uri.is_empty() => (album.uri.clone(), album.name.clone()),
            _ => (format!("local:{}", track.name), track.name.clone()),
        };
        if let Some(project) = projects.iter_mut().find(|p| p.key == key) {
            project.tracks.push(track);
        } else {
            projects.push(Project {
                key,
                album: track.album.clone(),
                name,
                tracks: vec![track],
            });
        }
    }
    projects
}

/// Whether two tracks are presumed to be the same recording.
fn same_song(a: &Track, b: &Track) -> bool {
    a.name == b.name
        && a.artists.len() == b.artists.len()
        && a.artists.iter().zip(&b.artists).all(|(x, y)| x.uri == y.uri)
}

/// Drop singles whose every track also appears on one album project.
fn drop_redundant_singles(projects: Vec<(Project, LengthClass)>) -> Vec<(Project, LengthClass)> {
    let albums: Vec<Vec<Track>> = projects
        .iter()
        .filter(|(_, class)| *class == LengthClass::Album)
        .map(|(p, _)| p.tracks.clone())
        .collect();
    projects
        .into_iter()
        .filter(|(project, class)| {
            let redundant = *class == LengthClass::Single
                && albums.iter().any(|album| {
                    project
                        .tracks
                        .iter()
                        .all(|t| album.iter().any(|a| same_song(t, a)))
                });
            if redundant {
                debug!(project = %project.name, "Dropping single released on an album");
            }
            !redundant
        })
        .collect()
}

impl Projects {
    /// Rebuild a project in album order when it repeats a track.
    async fn rebuild(session: &Session, project: &mut Project) -> Result<()> {
        let Some(album) = project.album.as_ref().filter(|a| !a.id.is_empty()) else {
            return Ok(());
        };
        let full = session.service().fetch(MobKind::Album, &album.id).await?;
        let wanted: HashSet<String> = project.tracks.iter().map(|t| t.uri.clone()).collect();
        project.tracks = contain::tracks(session.service(), &full)
            .await?
            .into_iter()
            .filter(|t| wanted.contains(&t.uri))
            .collect();
        Ok(())
    }
}

#[async_trait]
impl Sentence for Projects {
    async fn run(&self, session: &Session, subject: &State, query: Query) -> Result<State> {
        session.notify(SLOW_NOTICE);
        let source = query_or_subject(session, subject, query).await?;
        if !source.is_list() {
            return Err(Error::unsupported_query("projects", source.to_string()));
        }
        let tracks = contain::tracks(session.service(), &source).await?;

        let mut classified = Vec::new();
        for mut project in group(tracks) {
            if project.has_duplicates() {
                Self::rebuild(session, &mut project).await?;
            }
            let class = project.length_class();
            classified.push((project, class));
        }

        let objects = drop_redundant_singles(classified)
            .into_iter()
            .map(|(project, class)| {
                Mob::Collection(Collection {
                    name: project.name,
                    objects: project.tracks.into_iter().map(Mob::Track).collect(),
                    root_album: project.album,
                    length_class: Some(class),
                })
            })
            .collect();
        let result = Collection::new(format!("Projects: {}", source.name()), objects);
        Ok(subject.with_mob(Mob::Collection(result)))
    }
}
