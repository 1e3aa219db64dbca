//! WebSocket connector for `StreamChat`.
//!
//! Each [`Link`] is backed by one spawned task that performs the handshake,
//! forwards inbound text frames as fragments, and writes outbound text as
//! single frames. The task reports exactly one terminal event (`Closed` or
//! `Failed`) and exits; reconnection is the session controller's job.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::{Connector, Link, LinkEvent, LinkEventKind, TransportError};

/// Default timeout for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket links.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl WsConnector {
    /// Create a connector that gives up on a handshake after `connect_timeout`.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Connector for WsConnector {
    fn connect(&mut self, endpoint: &Url, epoch: u64, events: mpsc::Sender<LinkEvent>) -> Link {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_link(
            endpoint.clone(),
            epoch,
            self.connect_timeout,
            outbound_rx,
            events,
        ));
        Link::spawned(outbound_tx, task)
    }
}

/// Body of a link task: handshake, then pump frames both ways.
async fn run_link(
    endpoint: Url,
    epoch: u64,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<LinkEvent>,
) {
    let ws_stream = match tokio::time::timeout(connect_timeout, connect_async(endpoint.as_str()))
        .await
    {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            tracing::warn!(url = %endpoint, err = %e, "websocket connect failed");
            emit(&events, epoch, LinkEventKind::Failed(map_ws_connect_error(e))).await;
            return;
        }
        Err(_) => {
            tracing::warn!(url = %endpoint, "websocket connect timed out");
            emit(&events, epoch, LinkEventKind::Failed(TransportError::Timeout)).await;
            return;
        }
    };

    tracing::info!(url = %endpoint, epoch, "websocket connected");
    if !emit(&events, epoch, LinkEventKind::Opened).await {
        // Session dropped, nobody is listening.
        return;
    }

    let (mut ws_sender, mut ws_reader) = ws_stream.split();

    let terminal = loop {
        tokio::select! {
            frame = ws_reader.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !emit(&events, epoch, LinkEventKind::Fragment(text.as_str().to_owned())).await {
                        return;
                    }
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        if !emit(&events, epoch, LinkEventKind::Fragment(text)).await {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(err = %e, "non-UTF-8 binary frame, skipping");
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(epoch, "websocket closed by server");
                    break LinkEventKind::Closed;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    // Control frames are answered by tungstenite.
                }
                Some(Err(e)) => {
                    tracing::warn!(epoch, err = %e, "websocket read error");
                    break LinkEventKind::Failed(TransportError::WebSocket(e.to_string()));
                }
            },
            text = outbound.recv() => match text {
                Some(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!(epoch, err = %e, "websocket send failed");
                        break LinkEventKind::Failed(TransportError::WebSocket(e.to_string()));
                    }
                }
                None => {
                    // Link handle dropped without aborting; close politely.
                    let _ = ws_sender.close().await;
                    return;
                }
            },
        }
    };

    emit(&events, epoch, terminal).await;
    tracing::debug!(epoch, "link task exiting");
}

/// Report `kind` to the session. Returns `false` once the session is gone.
async fn emit(events: &mpsc::Sender<LinkEvent>, epoch: u64, kind: LinkEventKind) -> bool {
    events.send(LinkEvent::new(epoch, kind)).await.is_ok()
}

/// Map a `tokio_tungstenite` connection error to a [`TransportError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                TransportError::Unreachable(io_err.to_string())
            } else {
                TransportError::Io(io_err)
            }
        }
        WsError::Tls(_) => TransportError::WebSocket(format!("TLS error: {err}")),
        WsError::Http(response) => {
            TransportError::WebSocket(format!("HTTP error: status {}", response.status()))
        }
        other => TransportError::WebSocket(other.to_string()),
    }
}
