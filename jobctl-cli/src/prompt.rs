//! Interactive confirmation

use std::io::{self, BufRead, Write};

/// Asks the operator to confirm an irreversible action
pub trait Prompter: Send + Sync {
    /// Returns `true` only on an explicit yes
    fn confirm(&self, question: &str) -> bool;
}

/// Prompter reading the answer from standard input
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn confirm(&self, question: &str) -> bool {
        print!("{} [y/N] ", question);
        if io::stdout().flush().is_err() {
            return false;
        }

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_affirmative(&answer),
            Err(_) => false,
        }
    }
}

/// `y` or `yes` in any case; everything else declines
pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative("  YES "));
        assert!(is_affirmative("Yes"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative("yep"));
        assert!(!is_affirmative("no\n"));
    }
}
