//! The interactive shell: reads lines, evaluates them against the current
//! state and reports errors without leaving the loop.

pub mod parser;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info, warn};

use crate::contain;
use crate::error::{Error, Result};
use crate::mob::{Mob, MobKind, Track};
use crate::search::Query;
use crate::sentences::Sentences;
use crate::session::Session;
use crate::state::State;

pub use parser::{parse, Line, Param, TrackRef, Vocabulary};

/// Leaves the shell.
pub const EXIT: &str = "exit";
/// Forgets credentials and logs in again.
pub const LOGOUT: &str = "logout";

const NO_RESULTS: &str = "    No Results";
const API_FAILED: &str = "    ERROR: The Spotify operation failed";
const RECONNECTING: &str = "    ERROR: Connection was lost. Reconnecting...";

struct Words<'a> {
    sentences: &'a Sentences,
    state: &'a State,
}

impl Vocabulary for Words<'_> {
    fn is_sentence(&self, word: &str) -> bool {
        self.sentences.contains(word)
    }

    fn is_subshell(&self, word: &str) -> bool {
        self.state.subshell(word).is_some()
    }
}

/// A running shell.
#[derive(Debug)]
pub struct Shell {
    session: Session,
    sentences: Sentences,
    state: State,
}

impl Shell {
    /// A shell whose subject starts as the logged-in user.
    #[must_use]
    pub fn new(session: Session, sentences: Sentences) -> Self {
        let state = State::new(Mob::User(session.user().clone()));
        Self {
            session,
            sentences,
            state,
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// The session the shell runs in.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Parse and evaluate one line, updating the state on success.
    ///
    /// # Errors
    ///
    /// Returns syntax errors and whatever the sentences return.
    pub async fn execute(&mut self, input: &str) -> Result<()> {
        let line = parse(
            input,
            &Words {
                sentences: &self.sentences,
                state: &self.state,
            },
        )?;
        debug!(?line, "Evaluating");
        let next = self.eval(&line, &self.state, &self.state).await?;
        self.state = next;
        Ok(())
    }

    /// Evaluate `line` against `subject`. Query references resolve
    /// against `context`, the main state.
    fn eval<'a>(&'a self, line: &'a Line, context: &'a State, subject: &'a State) -> BoxFuture<'a, Result<State>> {
        async move {
            match line {
                Line::Empty => Ok(subject.clone()),
                Line::Run { verb, param } => {
                    let sentence = self
                        .sentences
                        .get(verb)
                        .ok_or_else(|| Error::syntax(format!("Unknown sentence '{verb}'")))?;
                    let query = match param {
                        Param::Text(text) => Query::Text(text.clone()),
                        Param::After(nested) => Query::Mob(self.eval(nested, context, context).await?.mob),
                        Param::Track(reference) => Query::Mob(self.resolve_track(&context.mob, reference).await?),
                    };
                    sentence.run(&self.session, subject, query).await
                }
                Line::Track(reference) => {
                    let track = self.resolve_track(&subject.mob, reference).await?;
                    Ok(subject.with_mob(track))
                }
                Line::In { subshell, line } => {
                    let inner = subject
                        .subshell(subshell)
                        .ok_or_else(|| Error::syntax("Invalid subshell name after 'in'"))?;
                    let result = self.eval(line, context, inner).await?;
                    Ok(subject.with_subshell(subshell, result))
                }
                Line::Load(name) => {
                    let inner = subject
                        .subshell(name)
                        .ok_or_else(|| Error::syntax("Invalid subshell name after 'in'"))?;
                    Ok(subject.with_mob(inner.mob.clone()))
                }
                Line::Define { name, line } => {
                    let result = self.eval(line, context, subject).await?;
                    info!("Created subshell {name}");
                    Ok(subject.with_subshell(name, State::new(result.mob)))
                }
            }
        }
        .boxed()
    }

    /// The referenced track of `mob`, fetched in full when it has an id.
    async fn resolve_track(&self, mob: &Mob, reference: &TrackRef) -> Result<Mob> {
        let tracks = contain::tracks(self.session.service(), mob).await?;
        if tracks.is_empty() && !mob.is_list() {
            return Err(Error::syntax(format!("'{mob}' does not contain tracks")));
        }
        let found: Option<Track> = match reference {
            TrackRef::Number(n) => n.checked_sub(1).and_then(|i| tracks.get(i)).cloned(),
            TrackRef::Name(name) => {
                let name = name.to_lowercase();
                tracks.into_iter().find(|t| t.name.to_lowercase() == name)
            }
        };
        let track = found.ok_or_else(|| Error::syntax(format!("Track {reference} was not found")))?;
        if track.id.is_empty() {
            return Ok(Mob::Track(track));
        }
        self.session.service().fetch(MobKind::Track, &track.id).await
    }

    /// Report an error to the user; connection errors trigger a new login.
    async fn report(&mut self, err: &Error) {
        if err.is_no_results() {
            self.session.notify(NO_RESULTS);
        } else if err.is_api_error() {
            warn!("Spotify operation failed: {err}");
            self.session.notify(API_FAILED);
        } else if err.is_connection_error() {
            warn!("Connection lost: {err}");
            self.session.notify(RECONNECTING);
            if let Err(err) = self.session.relogin().await {
                self.session.notify(&format!("    ERROR: {err}"));
            }
        } else {
            self.session.notify(&format!("    ERROR: {err}"));
        }
    }

    /// Forget credentials and log in again once the user confirms. Returns
    /// false when input ends before the confirmation.
    async fn logout(&mut self) -> Result<bool> {
        if !self.session.logout() {
            self.session.notify("Logout failed");
            return Ok(true);
        }
        if self.session.read_line("Press Enter to Login").is_none() {
            info!("Input closed before logging in again");
            return Ok(false);
        }
        self.session.relogin().await?;
        self.state = State::new(Mob::User(self.session.user().clone()));
        Ok(true)
    }

    /// Read and evaluate lines until `exit` or end of input, including end
    /// of input at the login prompt after `logout`.
    pub async fn run(&mut self) {
        loop {
            let prompt = format!("{} > ", self.state.mob);
            let Some(input) = self.session.read_line(&prompt) else {
                break;
            };
            let result = match input.trim() {
                EXIT => break,
                LOGOUT => match self.logout().await {
                    Ok(false) => break,
                    result => result.map(drop),
                },
                line => self.execute(line).await,
            };
            if let Err(err) = result {
                self.report(&err).await;
            }
        }
        info!("Shell closed");
    }
}
