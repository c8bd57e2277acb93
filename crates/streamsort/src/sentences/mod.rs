//! Sentences: the verbs of the shell language.
//!
//! A sentence takes the session, the subject state and a query, and
//! returns the new state. The built-in sentences are always available;
//! extensions are enabled by name.

mod builtin;
pub mod projects;
pub mod shuffle;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::search::Query;
use crate::session::Session;
use crate::state::State;

pub use builtin::{All, Add, Backup, New, Open, Play, Remove};
pub use projects::Projects;
pub use shuffle::Shuffle;

/// A verb of the shell language.
#[async_trait]
pub trait Sentence: Send + Sync {
    /// Apply the sentence to `subject` with `query`, returning the new state.
    async fn run(&self, session: &Session, subject: &State, query: Query) -> Result<State>;
}

/// The sentences available in a shell, by name.
#[derive(Clone)]
pub struct Sentences {
    by_name: BTreeMap<String, Arc<dyn Sentence>>,
}

impl std::fmt::Debug for Sentences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.by_name.keys()).finish()
    }
}

impl Default for Sentences {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Sentences {
    /// The built-in sentences.
    #[must_use]
    pub fn builtin() -> Self {
        let mut sentences = Self {
            by_name: BTreeMap::new(),
        };
        sentences.insert("open", Arc::new(Open));
        sentences.insert("get", Arc::new(Open));
        sentences.insert("add", Arc::new(Add));
        sentences.insert("remove", Arc::new(Remove));
        sentences.insert("play", Arc::new(Play));
        sentences.insert("all", Arc::new(All));
        sentences.insert("new", Arc::new(New));
        sentences.insert("backup", Arc::new(Backup));
        sentences
    }

    /// The built-in sentences plus the named extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if an extension name is unknown.
    pub fn with_extensions<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut sentences = Self::builtin();
        for name in names {
            sentences.enable(name.as_ref())?;
        }
        Ok(sentences)
    }

    /// Enable one extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension name is unknown.
    pub fn enable(&mut self, extension: &str) -> Result<()> {
        match extension {
            "shuffle" => self.insert("shuffle", Arc::new(Shuffle)),
            "projects" => self.insert("projects", Arc::new(Projects)),
            other => {
                return Err(Error::ConfigValidation {
                    message: format!("unknown extension: {other}"),
                })
            }
        }
        Ok(())
    }

    fn insert(&mut self, name: &str, sentence: Arc<dyn Sentence>) {
        self.by_name.insert(name.to_string(), sentence);
    }

    /// Look up a sentence.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Sentence>> {
        self.by_name.get(name).cloned()
    }

    /// Whether `name` is a sentence.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Sentence names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}
