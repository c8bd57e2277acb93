//! User interaction: notifications, confirmations and line input.

use std::io::{self, BufRead, Write};

/// How streamsort talks to the person at the keyboard.
pub trait Interaction: Send + Sync {
    /// Tell the user something.
    fn notify(&self, message: &str);

    /// Ask a yes/no question.
    fn confirm(&self, message: &str) -> bool;

    /// Read one line after showing `prompt`. `None` at end of input.
    fn read_line(&self, prompt: &str) -> Option<String>;
}

/// Whether a typed answer counts as "yes": empty, or starting with `y`.
#[must_use]
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().chars().next(), None | Some('y' | 'Y'))
}

/// Interaction over stdin and stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleInteraction;

impl Interaction for ConsoleInteraction {
    fn notify(&self, message: &str) {
        println!("{message}");
    }

    fn confirm(&self, message: &str) -> bool {
        self.read_line(&format!("{message} "))
            .is_some_and(|answer| is_affirmative(&answer))
    }

    fn read_line(&self, prompt: &str) -> Option<String> {
        let mut stdout = io::stdout();
        let _ = write!(stdout, "{prompt}");
        let _ = stdout.flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
        }
    }
}
