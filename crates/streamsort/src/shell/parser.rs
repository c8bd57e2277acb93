//! Parsing shell lines.
//!
//! Tokens are separated by whitespace. The first word decides what a line
//! does; see [`parse`] for the rules.

use std::fmt;

use crate::error::{Error, Result};

/// Escapes the word after it from being read as a keyword.
pub const NOM: &str = "nom";
/// Runs a nested line and uses its result.
pub const AFTER: &str = "after";
/// Refers to a track of the subject.
pub const TRACK: &str = "track";
/// Runs a line inside a subshell.
pub const IN: &str = "in";

/// A reference to one track of a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackRef {
    /// 1-based position.
    Number(usize),
    /// Track name, matched case-insensitively.
    Name(String),
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// What a sentence is applied with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// Search text, possibly empty.
    Text(String),
    /// The result of another line.
    After(Box<Line>),
    /// A track of the current subject.
    Track(TrackRef),
}

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Nothing to do.
    Empty,
    /// Apply a sentence.
    Run {
        /// Sentence name.
        verb: String,
        /// Its parameter.
        param: Param,
    },
    /// Make a track of the subject the new subject.
    Track(TrackRef),
    /// Run a line with a subshell as the subject.
    In {
        /// Subshell name.
        subshell: String,
        /// The line to run there.
        line: Box<Line>,
    },
    /// Make a subshell's object the subject.
    Load(String),
    /// Store the result of a line as a new subshell.
    Define {
        /// Subshell name.
        name: String,
        /// The line producing its object.
        line: Box<Line>,
    },
}

/// The words a parser treats specially besides the control words.
pub trait Vocabulary {
    /// Whether `word` names a sentence.
    fn is_sentence(&self, word: &str) -> bool;
    /// Whether `word` names an existing subshell.
    fn is_subshell(&self, word: &str) -> bool;
}

/// Parse one line.
///
/// # Errors
///
/// Returns [`Error::Syntax`] when the line is malformed.
pub fn parse(input: &str, vocabulary: &dyn Vocabulary) -> Result<Line> {
    let words: Vec<&str> = input.split_whitespace().collect();
    parse_words(&words, vocabulary)
}

fn parse_words(words: &[&str], vocabulary: &dyn Vocabulary) -> Result<Line> {
    let Some((&first, rest)) = words.split_first() else {
        return Ok(Line::Empty);
    };
    match first {
        NOM => Ok(Line::Empty),
        AFTER => parse_words(rest, vocabulary),
        TRACK => Ok(Line::Track(parse_track_ref(rest))),
        IN => {
            let Some((&name, line)) = rest.split_first() else {
                return Err(Error::syntax("Missing subshell name after 'in'"));
            };
            if !vocabulary.is_subshell(name) {
                return Err(Error::syntax("Invalid subshell name after 'in'"));
            }
            Ok(Line::In {
                subshell: name.to_string(),
                line: Box::new(parse_words(line, vocabulary)?),
            })
        }
        verb if vocabulary.is_sentence(verb) => Ok(Line::Run {
            verb: verb.to_string(),
            param: parse_param(rest, vocabulary)?,
        }),
        name if vocabulary.is_subshell(name) => {
            if rest.is_empty() {
                Ok(Line::Load(name.to_string()))
            } else {
                Err(Error::syntax(format!(
                    "Subshell loading does not take a parameter. Perhaps use 'in {name}...'"
                )))
            }
        }
        name => Ok(Line::Define {
            name: name.to_string(),
            line: Box::new(parse_words(rest, vocabulary)?),
        }),
    }
}

fn parse_param(words: &[&str], vocabulary: &dyn Vocabulary) -> Result<Param> {
    match words.split_first() {
        None => Ok(Param::Text(String::new())),
        Some((&AFTER, rest)) => Ok(Param::After(Box::new(parse_words(rest, vocabulary)?))),
        Some((&TRACK, rest)) => Ok(Param::Track(parse_track_ref(rest))),
        Some((&NOM, rest)) => Ok(Param::Text(rest.join(" "))),
        Some((&IN, _)) => Err(Error::syntax(
            "Parameter may not start with 'in'. Perhaps use 'nom in'",
        )),
        Some(_) => Ok(Param::Text(words.join(" "))),
    }
}

fn parse_track_ref(words: &[&str]) -> TrackRef {
    match words {
        [number] => number
            .parse()
            .map_or_else(|_| TrackRef::Name((*number).to_string()), TrackRef::Number),
        [NOM, rest @ ..] => TrackRef::Name(rest.join(" ")),
        _ => TrackRef::Name(words.join(" ")),
    }
}
