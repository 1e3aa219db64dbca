//! The session controller: one owner for the connection, the reveal queue,
//! the completion timer, the reconnect timer, and the message log.
//!
//! Every input reaches the controller as a plain method call from a single
//! event loop ([`crate::net`]): link events, due timers, and user commands.
//! Timers are `Option<Instant>` fields; cancelling one is assigning `None`,
//! so a superseded timer can never fire against newer state. Link events
//! carry the epoch of the connection that produced them, and anything from an
//! older epoch is dropped.

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use url::Url;

use crate::config::SessionConfig;
use crate::transport::{ConnectionState, Connector, Link, LinkEvent, LinkEventKind};

use super::completion::{CompletionDetector, Verdict};
use super::reveal::{RevealScheduler, Tick};
use super::{Exchange, MessageId, Session, SessionSnapshot};

/// Why a send was not carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendRejected {
    /// The text was empty after trimming.
    #[error("message is empty")]
    Empty,

    /// The connection is not open.
    #[error("not connected")]
    NotConnected,

    /// The session event loop has stopped.
    #[error("session stopped")]
    Stopped,
}

/// Why the active message was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeReason {
    /// Quiet window elapsed and the reveal drained.
    Completed,
    /// A new send superseded it.
    Superseded,
    /// The connection closed or failed.
    ConnectionLost,
    /// The connection was re-opened.
    Reopened,
    /// The session is shutting down.
    Shutdown,
}

/// Which timer is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Reveal,
    Completion,
    Reconnect,
}

/// Owns all mutable session state and reacts to events.
pub struct SessionController<C: Connector> {
    config: SessionConfig,
    endpoint: Url,
    connector: C,
    link_events: mpsc::Sender<LinkEvent>,
    link: Option<Link>,
    epoch: u64,
    state: ConnectionState,
    session: Session,
    reveal: RevealScheduler,
    completion: CompletionDetector,
    reconnect_at: Option<Instant>,
    view: watch::Sender<SessionSnapshot>,
}

impl<C: Connector> SessionController<C> {
    /// Create a controller in the `closed` state with an empty log.
    ///
    /// Links opened by the controller report on `link_events`; the caller owns
    /// the matching receiver and feeds its events back through
    /// [`handle_link_event`](Self::handle_link_event). Returns the controller
    /// and a receiver of snapshots for the presentation layer.
    pub fn new(
        config: SessionConfig,
        endpoint: Url,
        connector: C,
        link_events: mpsc::Sender<LinkEvent>,
    ) -> (Self, watch::Receiver<SessionSnapshot>) {
        let (view, view_rx) = watch::channel(SessionSnapshot::default());
        let controller = Self {
            reveal: RevealScheduler::new(config.reveal_interval),
            completion: CompletionDetector::new(config.quiet_window, config.drain_recheck()),
            config,
            endpoint,
            connector,
            link_events,
            link: None,
            epoch: 0,
            state: ConnectionState::Closed,
            session: Session::new(),
            reconnect_at: None,
            view,
        };
        (controller, view_rx)
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Epoch of the current (or most recent) connection.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The message log.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Characters received but not yet revealed.
    #[must_use]
    pub fn pending_units(&self) -> usize {
        self.reveal.pending()
    }

    /// When the next reconnection attempt is scheduled, if any.
    #[must_use]
    pub const fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// A snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::capture(&self.session, self.state)
    }

    /// Open a fresh connection, tearing down any existing one first.
    ///
    /// Discards the reveal queue, cancels the completion and reconnect timers,
    /// and finalizes the active message before the new attempt starts.
    pub fn open(&mut self) {
        if self.link.take().is_some() {
            tracing::debug!(epoch = self.epoch, "superseding existing connection");
        }
        self.finalize_active(FinalizeReason::Reopened);
        self.reconnect_at = None;
        self.epoch += 1;
        self.state = ConnectionState::Connecting;
        tracing::info!(url = %self.endpoint, epoch = self.epoch, "connecting");
        self.link = Some(
            self.connector
                .connect(&self.endpoint, self.epoch, self.link_events.clone()),
        );
        self.publish();
    }

    /// Send `text` to the remote party and start a new exchange.
    ///
    /// The text is trimmed; empty text, or a connection that is not open, is
    /// rejected without touching the log. Otherwise any active reply is
    /// finalized, the local message and an active reply placeholder are
    /// appended, and the trimmed text is transmitted.
    ///
    /// # Errors
    ///
    /// Returns [`SendRejected::Empty`] or [`SendRejected::NotConnected`].
    /// Neither has side effects.
    pub fn send(&mut self, text: &str) -> Result<Exchange, SendRejected> {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!("ignoring empty send");
            return Err(SendRejected::Empty);
        }
        if self.state != ConnectionState::Open || self.link.is_none() {
            tracing::debug!(state = %self.state, "ignoring send while not connected");
            return Err(SendRejected::NotConnected);
        }

        self.finalize_active(FinalizeReason::Superseded);
        let exchange = self.session.begin_exchange(text);
        if let Some(link) = &self.link
            && let Err(e) = link.transmit(text.to_owned())
        {
            // The link is already gone; its terminal event will follow.
            tracing::warn!(err = %e, "transmit failed");
        }
        tracing::debug!(reply = %exchange.reply, chars = text.chars().count(), "message sent");
        self.publish();
        Ok(exchange)
    }

    /// React to an event from a link.
    pub fn handle_link_event(&mut self, event: LinkEvent, now: Instant) {
        if event.epoch != self.epoch || self.link.is_none() {
            tracing::trace!(
                event_epoch = event.epoch,
                epoch = self.epoch,
                "dropping event from superseded connection"
            );
            return;
        }
        // Timers due before this event run first.
        self.poll_timers(now);
        match event.kind {
            LinkEventKind::Opened => {
                self.state = ConnectionState::Open;
                tracing::info!(epoch = self.epoch, "connection open");
                self.publish();
            }
            LinkEventKind::Fragment(fragment) => self.on_fragment(&fragment, now),
            LinkEventKind::Closed => {
                tracing::info!(epoch = self.epoch, "connection closed");
                self.on_connection_lost(now);
            }
            LinkEventKind::Failed(e) => {
                tracing::warn!(epoch = self.epoch, err = %e, "connection failed");
                self.on_connection_lost(now);
            }
        }
    }

    fn on_fragment(&mut self, fragment: &str, now: Instant) {
        if fragment.is_empty() {
            return;
        }
        if self.session.active_id().is_none() {
            let id = self.session.begin_unsolicited();
            tracing::debug!(reply = %id, "fragment with no active reply, starting a new one");
        }
        self.reveal.enqueue(fragment);
        self.reveal.start(now);
        self.completion.rearm(now);
        self.poll_timers(now);
    }

    fn on_connection_lost(&mut self, now: Instant) {
        self.link = None;
        self.state = ConnectionState::Closed;
        self.finalize_active(FinalizeReason::ConnectionLost);
        let at = now + self.config.retry_delay;
        self.reconnect_at = Some(at);
        tracing::info!(
            delay_ms = u64::try_from(self.config.retry_delay.as_millis()).unwrap_or(u64::MAX),
            "reconnect scheduled"
        );
        self.publish();
    }

    /// Earliest pending timer deadline, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.reveal.next_tick(),
            self.completion.deadline(),
            self.reconnect_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Run every timer due at or before `now`, in deadline order.
    ///
    /// Each timer runs at its own deadline, so a late poll replays the same
    /// sequence of reveals and checks a punctual one would have.
    pub fn poll_timers(&mut self, now: Instant) {
        let mut changed = false;
        while let Some((timer, at)) = self.earliest_due(now) {
            changed = true;
            match timer {
                Timer::Reveal => {
                    if self.reveal.tick(at, &mut self.session) == Tick::Halted {
                        tracing::trace!("reveal loop idle");
                    }
                }
                Timer::Completion => {
                    let idle = self.reveal.is_idle();
                    if self.completion.evaluate(at, idle) == Verdict::Complete {
                        self.finalize_active(FinalizeReason::Completed);
                    }
                }
                Timer::Reconnect => {
                    tracing::info!("attempting to reconnect");
                    // open() publishes and clears the reconnect timer.
                    self.open();
                }
            }
        }
        if changed {
            self.publish();
        }
    }

    fn earliest_due(&self, now: Instant) -> Option<(Timer, Instant)> {
        [
            (Timer::Reveal, self.reveal.next_tick()),
            (Timer::Completion, self.completion.deadline()),
            (Timer::Reconnect, self.reconnect_at),
        ]
        .into_iter()
        .filter_map(|(timer, at)| at.filter(|at| *at <= now).map(|at| (timer, at)))
        .min_by_key(|(_, at)| *at)
    }

    /// Drop the connection and every timer, and finalize the active message.
    pub fn shutdown(&mut self) {
        self.link = None;
        self.reconnect_at = None;
        self.state = ConnectionState::Closed;
        self.finalize_active(FinalizeReason::Shutdown);
        tracing::info!("session shut down");
        self.publish();
    }

    fn finalize_active(&mut self, reason: FinalizeReason) -> Option<MessageId> {
        self.reveal.cancel();
        self.completion.cancel();
        let id = self.session.finalize_active()?;
        tracing::debug!(reply = %id, ?reason, "reply finalized");
        Some(id)
    }

    fn publish(&self) {
        debug_assert!(self.session.active_count() <= 1);
        self.view.send_replace(self.snapshot());
    }
}
