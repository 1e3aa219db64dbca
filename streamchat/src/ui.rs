//! Line-oriented transcript rendering.
//!
//! [`TranscriptPrinter`] turns successive [`SessionSnapshot`]s into
//! append-only terminal output: connection changes on their own line, local
//! messages once, and remote replies character by character as they are
//! revealed. A reply's line is closed when it is finalized or when other
//! output has to interrupt it.

use std::collections::HashMap;
use std::io::{self, Write};

use crate::session::{Author, MessageId, SessionSnapshot};
use crate::transport::ConnectionState;

/// Prefix for messages typed locally.
const LOCAL_PREFIX: &str = "you> ";
/// Prefix for remote replies.
const REMOTE_PREFIX: &str = "bot> ";

/// Incremental renderer for session snapshots.
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    /// Characters already written, per message.
    written: HashMap<MessageId, usize>,
    /// Reply whose line is currently open.
    open_line: Option<MessageId>,
    last_state: Option<ConnectionState>,
}

impl TranscriptPrinter {
    /// Create a printer that has written nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write whatever `snapshot` adds over what was already written.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from `out`.
    pub fn render(&mut self, snapshot: &SessionSnapshot, out: &mut impl Write) -> io::Result<()> {
        if self.last_state != Some(snapshot.state) {
            self.close_line(out)?;
            writeln!(out, "{}", status_line(snapshot.state))?;
            self.last_state = Some(snapshot.state);
        }

        for message in &snapshot.messages {
            let total = message.text.chars().count();
            let done = self.written.get(&message.id).copied();
            match message.author {
                Author::Local => {
                    if done.is_none() {
                        self.close_line(out)?;
                        writeln!(out, "{LOCAL_PREFIX}{}", message.text)?;
                        self.written.insert(message.id, total);
                    }
                }
                Author::Remote => {
                    let done = done.unwrap_or(0);
                    if total > done {
                        if self.open_line != Some(message.id) {
                            self.close_line(out)?;
                            write!(out, "{REMOTE_PREFIX}")?;
                            self.open_line = Some(message.id);
                        }
                        let fresh: String = message.text.chars().skip(done).collect();
                        write!(out, "{fresh}")?;
                        self.written.insert(message.id, total);
                    }
                    if !message.active && self.open_line == Some(message.id) {
                        self.close_line(out)?;
                    }
                }
            }
        }

        out.flush()
    }

    fn close_line(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.open_line.take().is_some() {
            writeln!(out)?;
        }
        Ok(())
    }
}

fn status_line(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connecting => "-- connecting...",
        ConnectionState::Open => "-- connected",
        ConnectionState::Closed => "-- disconnected",
    }
}
