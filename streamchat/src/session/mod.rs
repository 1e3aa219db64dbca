//! Streaming session state for `StreamChat`.
//!
//! The [`Session`] is the ordered log of local and remote messages plus the
//! pointer to the one remote message currently receiving revealed text. The
//! [`controller::SessionController`] drives it from link events and timers;
//! [`reveal`] and [`completion`] hold the pacing and end-of-message logic.
//!
//! # Invariants
//!
//! - At most one [`Message`] in the log has `active == true`.
//! - [`Session::active_id`] is `Some` exactly when such a message exists.
//! - The log is append-only; only the active message's `text` and `active`
//!   fields are ever mutated in place.

pub mod completion;
pub mod controller;
pub mod reveal;

use std::fmt;

use uuid::Uuid;

use crate::transport::ConnectionState;

/// Unique identifier for a message in the session log.
///
/// Uses UUID v7 so identifiers sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Author {
    /// Typed by the user of this client.
    Local,
    /// Streamed from the remote party.
    Remote,
}

/// One entry in the session log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Identifier assigned at creation.
    pub id: MessageId,
    /// Who wrote it.
    pub author: Author,
    /// Text revealed so far (fixed for local messages).
    pub text: String,
    /// Whether this message is still receiving revealed text.
    pub active: bool,
}

impl Message {
    fn local(text: &str) -> Self {
        Self {
            id: MessageId::new(),
            author: Author::Local,
            text: text.to_owned(),
            active: false,
        }
    }

    fn remote_placeholder() -> Self {
        Self {
            id: MessageId::new(),
            author: Author::Remote,
            text: String::new(),
            active: true,
        }
    }
}

/// The pair of messages created by a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    /// The local message carrying the sent text.
    pub local: MessageId,
    /// The remote placeholder that will receive the reply.
    pub reply: MessageId,
}

/// Ordered message log with a single active-message pointer.
#[derive(Debug, Default)]
pub struct Session {
    log: Vec<Message>,
    /// Index into `log` of the active message. Stable because the log is append-only.
    active: Option<usize>,
}

impl Session {
    /// Create an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages in chronological order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.log
    }

    /// Number of messages in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Identifier of the active message, if any.
    #[must_use]
    pub fn active_id(&self) -> Option<MessageId> {
        self.active_message().map(|m| m.id)
    }

    /// The active message, if any.
    #[must_use]
    pub fn active_message(&self) -> Option<&Message> {
        self.active.and_then(|idx| self.log.get(idx))
    }

    /// True iff a message is active and nothing has been revealed into it yet.
    #[must_use]
    pub fn is_typing(&self) -> bool {
        self.active_message().is_some_and(|m| m.text.is_empty())
    }

    /// Count of messages flagged active. Always 0 or 1.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.log.iter().filter(|m| m.active).count()
    }

    /// Append a local message and an active remote placeholder.
    ///
    /// Any message still active is finalized first so the new placeholder
    /// is the only active entry.
    pub fn begin_exchange(&mut self, text: &str) -> Exchange {
        self.finalize_active();
        let local = Message::local(text);
        let local_id = local.id;
        self.log.push(local);
        let reply = self.push_placeholder();
        Exchange {
            local: local_id,
            reply,
        }
    }

    /// Append an active remote placeholder that is not tied to a send.
    ///
    /// Used when the remote side streams text while nothing is active.
    pub fn begin_unsolicited(&mut self) -> MessageId {
        self.finalize_active();
        self.push_placeholder()
    }

    fn push_placeholder(&mut self) -> MessageId {
        let placeholder = Message::remote_placeholder();
        let id = placeholder.id;
        self.active = Some(self.log.len());
        self.log.push(placeholder);
        id
    }

    /// Append one revealed character to the active message.
    ///
    /// Returns `false` (and drops the character) when nothing is active.
    pub fn reveal_into_active(&mut self, unit: char) -> bool {
        match self.active.and_then(|idx| self.log.get_mut(idx)) {
            Some(message) => {
                message.text.push(unit);
                true
            }
            None => false,
        }
    }

    /// Mark the active message terminal and clear the pointer.
    ///
    /// Returns the id of the message that was finalized, if any.
    pub fn finalize_active(&mut self) -> Option<MessageId> {
        let idx = self.active.take()?;
        let message = self.log.get_mut(idx)?;
        message.active = false;
        Some(message.id)
    }
}

/// Read-only view of the session published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// The message log at the time of the snapshot.
    pub messages: Vec<Message>,
    /// Connection state at the time of the snapshot.
    pub state: ConnectionState,
    /// Whether the connection is open.
    pub connected: bool,
    /// Whether the typing indicator should be shown.
    pub typing: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            state: ConnectionState::Closed,
            connected: false,
            typing: false,
        }
    }
}

impl SessionSnapshot {
    pub(crate) fn capture(session: &Session, state: ConnectionState) -> Self {
        Self {
            messages: session.messages().to_vec(),
            state,
            connected: state == ConnectionState::Open,
            typing: session.is_typing(),
        }
    }

    /// The most recent remote message, if any.
    #[must_use]
    pub fn last_reply(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.author == Author::Remote)
    }
}
