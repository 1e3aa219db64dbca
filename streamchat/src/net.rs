//! Session event loop for wiring a front end to the session controller.
//!
//! [`spawn_session`] starts one background tokio task that owns a
//! [`SessionController`] and is the only place its state is touched. The
//! front end talks to it through a [`SessionHandle`]:
//!
//! ```text
//! front end  ─── SessionCommand ──→  session task  ←── LinkEvent ─── link tasks
//!            ←── SessionSnapshot ───  (watch)
//! ```
//!
//! The task waits on three sources at once: link events, commands, and the
//! controller's earliest timer deadline.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use url::Url;

use crate::config::SessionConfig;
use crate::identity::ClientId;
use crate::session::controller::{SendRejected, SessionController};
use crate::session::{Exchange, SessionSnapshot};
use crate::transport::websocket::WsConnector;
use crate::transport::{Connector, TransportError, endpoint_for};

/// Commands sent from the front end to the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Send a text message.
    Send {
        /// Raw text as typed; trimmed by the controller.
        text: String,
        /// Receives the outcome.
        reply: oneshot::Sender<Result<Exchange, SendRejected>>,
    },
    /// Drop the current connection and connect again immediately.
    Reconnect,
    /// Finalize everything and stop the task.
    Shutdown,
}

/// Front-end handle to a running session.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<SessionSnapshot>,
    task: tokio::task::JoinHandle<()>,
}

impl SessionHandle {
    /// Send `text` and wait for the controller's verdict.
    ///
    /// # Errors
    ///
    /// Returns the controller's [`SendRejected`] reason, or
    /// [`SendRejected::Stopped`] if the session task is gone.
    pub async fn send(&self, text: &str) -> Result<Exchange, SendRejected> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(SessionCommand::Send {
                text: text.to_owned(),
                reply,
            })
            .await
            .map_err(|_| SendRejected::Stopped)?;
        outcome.await.map_err(|_| SendRejected::Stopped)?
    }

    /// Ask the session to re-open its connection now.
    pub async fn reconnect(&self) {
        if self.commands.send(SessionCommand::Reconnect).await.is_err() {
            tracing::debug!("reconnect requested after session stopped");
        }
    }

    /// Stop the session and wait for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::warn!(err = %e, "session task ended abnormally");
        }
    }

    /// The latest published snapshot.
    #[must_use]
    pub fn view(&self) -> SessionSnapshot {
        self.view.borrow().clone()
    }

    /// A fresh receiver of snapshots, for rendering on change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.view.clone()
    }
}

/// Connect to the backend over WebSocket and start the session task.
///
/// # Errors
///
/// Returns [`TransportError::InvalidEndpoint`] if `base_endpoint` combined
/// with `client_id` does not form a usable WebSocket URL. Connection failures
/// are not errors here; the session retries them on its own.
pub fn spawn_session(
    config: SessionConfig,
    base_endpoint: &str,
    client_id: &ClientId,
) -> Result<SessionHandle, TransportError> {
    let endpoint = endpoint_for(base_endpoint, client_id.as_str())?;
    let connector = WsConnector::new(config.connect_timeout);
    Ok(spawn_session_with(config, endpoint, connector))
}

/// Start the session task with an arbitrary [`Connector`].
///
/// The task opens the first connection immediately.
pub fn spawn_session_with<C: Connector>(
    config: SessionConfig,
    endpoint: Url,
    connector: C,
) -> SessionHandle {
    let capacity = config.channel_capacity.max(1);
    let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
    let (link_tx, link_rx) = mpsc::channel(capacity);
    let (controller, view) = SessionController::new(config, endpoint, connector, link_tx);
    let task = tokio::spawn(run_session(controller, cmd_rx, link_rx));
    SessionHandle {
        commands: cmd_tx,
        view,
        task,
    }
}

/// Body of the session task.
async fn run_session<C: Connector>(
    mut controller: SessionController<C>,
    mut commands: mpsc::Receiver<SessionCommand>,
    mut link_events: mpsc::Receiver<crate::transport::LinkEvent>,
) {
    controller.open();

    loop {
        let deadline = controller.next_deadline();
        tokio::select! {
            Some(event) = link_events.recv() => {
                controller.handle_link_event(event, Instant::now());
            }
            cmd = commands.recv() => match cmd {
                Some(SessionCommand::Send { text, reply }) => {
                    let _ = reply.send(controller.send(&text));
                }
                Some(SessionCommand::Reconnect) => {
                    tracing::info!("manual reconnect requested");
                    controller.open();
                }
                Some(SessionCommand::Shutdown) | None => break,
            },
            () = sleep_until_opt(deadline) => {
                controller.poll_timers(Instant::now());
            }
        }
    }

    controller.shutdown();
    tracing::debug!("session task exiting");
}

/// Sleep until `deadline`, or forever if there is none.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
