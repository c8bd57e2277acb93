//! Shell state: the current subject plus named subshells.

use std::collections::BTreeMap;

use crate::mob::Mob;

/// The state of a shell, or of one of its subshells.
///
/// States are values. Sentences take a state and return a new one; the
/// session holding the API handle lives elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    /// The current subject.
    pub mob: Mob,
    /// Saved states by name.
    pub subshells: BTreeMap<String, State>,
}

impl State {
    /// A state with the given subject and no subshells.
    #[must_use]
    pub fn new(mob: Mob) -> Self {
        Self {
            mob,
            subshells: BTreeMap::new(),
        }
    }

    /// A state with a new subject, keeping this state's subshells.
    #[must_use]
    pub fn with_mob(&self, mob: Mob) -> Self {
        Self {
            mob,
            subshells: self.subshells.clone(),
        }
    }

    /// This state with `name` set to `subshell`, replacing any previous one.
    #[must_use]
    pub fn with_subshell(&self, name: impl Into<String>, subshell: State) -> Self {
        let mut subshells = self.subshells.clone();
        subshells.insert(name.into(), subshell);
        Self {
            mob: self.mob.clone(),
            subshells,
        }
    }

    /// Look up a subshell.
    #[must_use]
    pub fn subshell(&self, name: &str) -> Option<&State> {
        self.subshells.get(name)
    }
}
