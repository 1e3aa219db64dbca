//! Server core: shared state, WebSocket handler, and reply streaming.
//!
//! Clients connect to `/ws/{client_id}`. Every text frame is one user
//! message: it is recorded in the client's history, answered by the
//! configured [`Responder`], and the reply is streamed back as a series of
//! text frames. A new message from the same connection cancels a reply that
//! is still streaming.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};

use crate::config::{ReplySettings, ServerConfig};
use crate::history::{ConversationStore, Role};
use crate::responder::{EchoResponder, Responder, split_fragments};

/// Shared server state.
pub struct ServerState {
    /// Maps client id to the channel feeding its WebSocket writer.
    connections: RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>,
    /// Per-client conversation history.
    pub history: ConversationStore,
    responder: Arc<dyn Responder>,
    reply: ReplySettings,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    /// Creates state with the echo responder and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&ServerConfig::default(), Arc::new(EchoResponder))
    }

    /// Creates state from a resolved config and a responder.
    #[must_use]
    pub fn with_config(config: &ServerConfig, responder: Arc<dyn Responder>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            history: ConversationStore::with_max_turns(config.max_history),
            responder,
            reply: config.reply,
        }
    }

    /// Registers a connection for `client_id`, returning the one it replaced.
    pub async fn register(
        &self,
        client_id: &str,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Option<mpsc::UnboundedSender<Message>> {
        self.connections
            .write()
            .await
            .insert(client_id.to_string(), sender)
    }

    /// Removes `client_id` if it is still registered with `sender`.
    ///
    /// A newer connection for the same client is left alone.
    pub async fn unregister(&self, client_id: &str, sender: &mpsc::UnboundedSender<Message>) {
        let mut conns = self.connections.write().await;
        if conns
            .get(client_id)
            .is_some_and(|current| current.same_channel(sender))
        {
            conns.remove(client_id);
        }
    }

    /// Number of connected clients.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a WebSocket Close frame to every connected client.
    pub async fn close_all_connections(&self) {
        let conns = self.connections.read().await;
        for (client_id, sender) in conns.iter() {
            tracing::info!(client_id = %client_id, "sending close frame to client");
            let _ = sender.send(Message::Close(None));
        }
    }
}

/// Handles an upgraded WebSocket connection for one client.
pub async fn handle_socket(socket: WebSocket, client_id: String, state: Arc<ServerState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    if state.register(&client_id, tx.clone()).await.is_some() {
        tracing::info!(client_id = %client_id, "replaced existing connection");
    }
    tracing::info!(client_id = %client_id, "client connected");

    // Writer: forward queued frames; a Close frame ends the connection.
    let writer_client = client_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(client_id = %writer_client, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let reader_client = client_id.clone();
    let reader_state = Arc::clone(&state);
    let reader_tx = tx.clone();
    let mut read_task = tokio::spawn(async move {
        let mut streaming: Option<tokio::task::JoinHandle<()>> = None;
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let text = text.as_str().trim();
                    if text.is_empty() {
                        continue;
                    }
                    if let Some(previous) = streaming.take() {
                        previous.abort();
                    }
                    let reply = answer(&reader_state, &reader_client, text).await;
                    streaming = Some(tokio::spawn(stream_reply(
                        reply,
                        reader_state.reply,
                        reader_tx.clone(),
                    )));
                }
                Message::Close(_) => {
                    tracing::info!(client_id = %reader_client, "received close frame");
                    break;
                }
                _ => {
                    // Binary, ping, and pong frames are ignored.
                }
            }
        }
        if let Some(previous) = streaming.take() {
            previous.abort();
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.unregister(&client_id, &tx).await;
    tracing::info!(client_id = %client_id, "client disconnected");
}

/// Record `text`, produce a reply, and record the reply.
async fn answer(state: &ServerState, client_id: &str, text: &str) -> String {
    state.history.append(client_id, Role::User, text).await;
    let history = state.history.turns(client_id).await;
    let reply = state.responder.respond(&history, text);
    state
        .history
        .append(client_id, Role::Assistant, &reply)
        .await;
    tracing::debug!(
        client_id = %client_id,
        turns = history.len() + 1,
        chars = reply.chars().count(),
        "reply ready"
    );
    reply
}

/// Send `reply` to the writer as paced fragments.
async fn stream_reply(reply: String, settings: ReplySettings, tx: mpsc::UnboundedSender<Message>) {
    for (i, fragment) in split_fragments(&reply, settings.chunk_chars)
        .into_iter()
        .enumerate()
    {
        if i > 0 && !settings.chunk_delay.is_zero() {
            tokio::time::sleep(settings.chunk_delay).await;
        }
        if tx.send(Message::Text(fragment.into())).is_err() {
            return;
        }
    }
}

/// Starts the server on the given address with default state.
///
/// Returns the bound address and a handle to the serving task.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(ServerState::new())).await
}

/// Starts the server with a pre-configured [`ServerState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<ServerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws/{client_id}", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::Path(client_id): axum::extract::Path<String>,
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}
