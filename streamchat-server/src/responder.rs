//! Reply generation and fragmenting.

use crate::history::{Role, Turn};

/// Produces the reply to a user's message.
pub trait Responder: Send + Sync {
    /// Reply to `input`. `history` is the conversation so far, ending with
    /// the user turn for `input`.
    fn respond(&self, history: &[Turn], input: &str) -> String;
}

/// Replies with the user's own text.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoResponder;

impl Responder for EchoResponder {
    fn respond(&self, _history: &[Turn], input: &str) -> String {
        input.to_string()
    }
}

/// Replies with how many messages the user has sent so far.
///
/// Handy for checking that history survives reconnects.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingResponder;

impl Responder for CountingResponder {
    fn respond(&self, history: &[Turn], input: &str) -> String {
        let count = history.iter().filter(|t| t.role == Role::User).count();
        format!("#{count}: {input}")
    }
}

/// Cut `text` into fragments of at most `chunk_chars` characters.
///
/// Never splits inside a character. A `chunk_chars` of zero is treated as one.
#[must_use]
pub fn split_fragments(text: &str, chunk_chars: usize) -> Vec<String> {
    let chunk_chars = chunk_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
