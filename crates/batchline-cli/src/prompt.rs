//! Terminal conflict prompt.
//!
//! Answers: `s`, `o`, `r`, `c` (or the full words) apply to one conflict;
//! an uppercase letter or a trailing `all` applies the choice to the rest of
//! the batch. An empty line or end of input dismisses the prompt.

use std::io::{self, BufRead, Write};
use std::path::Path;

use async_trait::async_trait;
use batchline_core::{ConflictAction, ConflictDecision, DecisionProvider};
use tracing::warn;

/// Asks on stderr and reads the answer from stdin.
pub(crate) struct TerminalDecisionProvider;

#[async_trait]
impl DecisionProvider for TerminalDecisionProvider {
    async fn ask_file_action(&self, destination: &Path) -> Option<ConflictDecision> {
        let destination = destination.to_path_buf();
        let answer = tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut output = io::stderr();
            ask(&destination, &mut input, &mut output)
        })
        .await;
        match answer {
            Ok(decision) => decision,
            Err(err) => {
                warn!(error = %err, "conflict prompt task failed");
                None
            }
        }
    }
}

pub(crate) fn ask(
    destination: &Path,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Option<ConflictDecision> {
    loop {
        write!(
            output,
            "{} already exists. [s]kip, [o]verwrite, [r]ename, [c]ancel (uppercase = all): ",
            destination.display()
        )
        .ok()?;
        output.flush().ok()?;

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
        let answer = line.trim();
        if answer.is_empty() {
            return None;
        }
        match parse_answer(answer) {
            Some(decision) => return Some(decision),
            None => writeln!(output, "unrecognised answer: {answer}").ok()?,
        }
    }
}

pub(crate) fn parse_answer(answer: &str) -> Option<ConflictDecision> {
    let answer = answer.trim();
    let (word, apply_to_all) = match answer
        .strip_suffix("all")
        .map(str::trim_end)
        .filter(|word| !word.is_empty())
    {
        Some(word) => (word, true),
        None => (answer, answer.len() == 1 && answer.chars().all(char::is_uppercase)),
    };
    let action = match word.to_ascii_lowercase().as_str() {
        "s" => ConflictAction::Skip,
        "o" => ConflictAction::Overwrite,
        "r" => ConflictAction::Rename,
        "c" => ConflictAction::Cancel,
        other => other.parse().ok()?,
    };
    Some(ConflictDecision {
        action,
        apply_to_all,
    })
}
