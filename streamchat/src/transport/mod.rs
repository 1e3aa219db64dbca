//! Connection layer for `StreamChat`.
//!
//! A [`Connector`] opens one [`Link`] per connection attempt. Each link runs
//! independently and reports what happens to it as [`LinkEvent`]s tagged with
//! the epoch it was opened under, so the session controller can ignore
//! anything a superseded connection still has in flight.
//!
//! Implementations:
//! - [`websocket::WsConnector`]: WebSocket client over `tokio-tungstenite`
//! - [`loopback::LoopbackConnector`]: in-process connector for tests

pub mod loopback;
pub mod websocket;

use std::fmt;

use tokio::sync::mpsc;
use url::Url;

/// Lifecycle state of the session's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A connection attempt is in progress.
    Connecting,
    /// The connection is established and can carry sends.
    Open,
    /// No connection; a retry may be scheduled.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Errors that can occur in the connection layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The handshake did not complete in time.
    #[error("connection attempt timed out")]
    Timeout,

    /// The endpoint URL is unusable.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The server refused or could not be reached.
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// WebSocket protocol failure.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What happened on a link.
#[derive(Debug)]
pub enum LinkEventKind {
    /// The handshake completed.
    Opened,
    /// A raw text fragment arrived.
    Fragment(String),
    /// The remote side closed the connection.
    Closed,
    /// The connection failed (handshake or mid-stream).
    Failed(TransportError),
}

/// A [`LinkEventKind`] tagged with the epoch of the link that produced it.
#[derive(Debug)]
pub struct LinkEvent {
    /// Epoch the link was opened under.
    pub epoch: u64,
    /// What happened.
    pub kind: LinkEventKind,
}

impl LinkEvent {
    /// Tag `kind` with `epoch`.
    #[must_use]
    pub const fn new(epoch: u64, kind: LinkEventKind) -> Self {
        Self { epoch, kind }
    }
}

/// Handle to one connection attempt.
///
/// Outbound text is handed to the link's task through an unbounded channel.
/// Dropping the handle aborts the task, which tears down the socket.
#[derive(Debug)]
pub struct Link {
    outbound: mpsc::UnboundedSender<String>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Link {
    /// Wrap a spawned connection task.
    #[must_use]
    pub const fn spawned(
        outbound: mpsc::UnboundedSender<String>,
        task: tokio::task::JoinHandle<()>,
    ) -> Self {
        Self {
            outbound,
            task: Some(task),
        }
    }

    /// Wrap an outbound channel with no task behind it.
    #[must_use]
    pub const fn detached(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            outbound,
            task: None,
        }
    }

    /// Queue `text` for transmission as a single frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the link's task has exited.
    pub fn transmit(&self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(text)
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Opens links to a fixed endpoint.
pub trait Connector: Send + 'static {
    /// Start a connection attempt to `endpoint`.
    ///
    /// The returned link must report its lifecycle on `events`, tagging every
    /// event with `epoch`: `Opened` once the handshake completes, then any
    /// number of `Fragment`s, then exactly one `Closed` or `Failed`.
    fn connect(&mut self, endpoint: &Url, epoch: u64, events: mpsc::Sender<LinkEvent>) -> Link;
}

/// Build the per-client endpoint by appending `client_id` as the last path segment.
///
/// # Errors
///
/// Returns [`TransportError::InvalidEndpoint`] if `base` is not a `ws://` or
/// `wss://` URL, or if `client_id` is empty.
pub fn endpoint_for(base: &str, client_id: &str) -> Result<Url, TransportError> {
    if client_id.is_empty() {
        return Err(TransportError::InvalidEndpoint(
            "client id must not be empty".to_string(),
        ));
    }
    let mut url = Url::parse(base).map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(TransportError::InvalidEndpoint(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    url.path_segments_mut()
        .map_err(|()| TransportError::InvalidEndpoint(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .push(client_id);
    Ok(url)
}
