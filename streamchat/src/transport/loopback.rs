//! Loopback connector for testing.
//!
//! [`LoopbackConnector`] never touches the network. Every call to
//! [`Connector::connect`] replaces the "current" connection, and the test
//! drives that connection by hand: accept it, push fragments, hang up, or
//! fail it. Text the session transmits is captured and can be inspected with
//! [`LoopbackConnector::transmitted`]. Clones share state, so a test keeps one
//! clone while the session owns another.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use super::{Connector, Link, LinkEvent, LinkEventKind, TransportError};

/// The connection most recently opened through the connector.
struct CurrentLink {
    epoch: u64,
    events: mpsc::Sender<LinkEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
}

#[derive(Default)]
struct Shared {
    attempts: Vec<(u64, Url)>,
    current: Option<CurrentLink>,
    transmitted: Vec<String>,
}

impl Shared {
    fn drain_outbound(&mut self) {
        if let Some(current) = self.current.as_mut() {
            while let Ok(text) = current.outbound.try_recv() {
                self.transmitted.push(text);
            }
        }
    }
}

/// In-process [`Connector`] driven by the test.
#[derive(Clone, Default)]
pub struct LoopbackConnector {
    shared: Arc<Mutex<Shared>>,
}

impl std::fmt::Debug for LoopbackConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("LoopbackConnector")
            .field("attempts", &shared.attempts.len())
            .field("current_epoch", &shared.current.as_ref().map(|c| c.epoch))
            .finish_non_exhaustive()
    }
}

impl LoopbackConnector {
    /// Create a connector with no connection attempts yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the session asked for a connection.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.shared.lock().attempts.len()
    }

    /// Endpoint of the most recent connection attempt.
    #[must_use]
    pub fn last_endpoint(&self) -> Option<Url> {
        self.shared.lock().attempts.last().map(|(_, url)| url.clone())
    }

    /// Epoch of the current connection, if one is outstanding.
    #[must_use]
    pub fn current_epoch(&self) -> Option<u64> {
        self.shared.lock().current.as_ref().map(|c| c.epoch)
    }

    /// Complete the handshake of the current connection.
    pub fn accept(&self) -> bool {
        self.emit(LinkEventKind::Opened, false)
    }

    /// Deliver a fragment on the current connection.
    pub fn deliver(&self, fragment: &str) -> bool {
        self.emit(LinkEventKind::Fragment(fragment.to_owned()), false)
    }

    /// Close the current connection from the remote side.
    pub fn hang_up(&self) -> bool {
        self.emit(LinkEventKind::Closed, true)
    }

    /// Fail the current connection.
    pub fn fail(&self, reason: &str) -> bool {
        self.emit(
            LinkEventKind::Failed(TransportError::WebSocket(reason.to_owned())),
            true,
        )
    }

    /// Everything the session transmitted so far, across all connections.
    #[must_use]
    pub fn transmitted(&self) -> Vec<String> {
        let mut shared = self.shared.lock();
        shared.drain_outbound();
        shared.transmitted.clone()
    }

    fn emit(&self, kind: LinkEventKind, terminal: bool) -> bool {
        let mut shared = self.shared.lock();
        shared.drain_outbound();
        let Some(current) = shared.current.as_ref() else {
            return false;
        };
        let sent = current
            .events
            .try_send(LinkEvent::new(current.epoch, kind))
            .is_ok();
        if terminal {
            shared.current = None;
        }
        sent
    }
}

impl Connector for LoopbackConnector {
    fn connect(&mut self, endpoint: &Url, epoch: u64, events: mpsc::Sender<LinkEvent>) -> Link {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let mut shared = self.shared.lock();
        shared.drain_outbound();
        shared.attempts.push((epoch, endpoint.clone()));
        shared.current = Some(CurrentLink {
            epoch,
            events,
            outbound: outbound_rx,
        });
        Link::detached(outbound_tx)
    }
}
