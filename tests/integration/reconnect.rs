// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for connection loss and fixed-delay reconnection.
//!
//! Two kinds of disconnect are exercised:
//! - a clean close, via `ServerState::close_all_connections`
//! - an abrupt TCP teardown, via a proxy placed between client and server
//!
//! The proxy also lets a test take the "server" away entirely and bring it
//! back on the same port, to check that retries keep going at the fixed
//! delay until one succeeds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use streamchat::config::SessionConfig;
use streamchat::identity::ClientId;
use streamchat::net::{self, SessionHandle};
use streamchat::session::SessionSnapshot;
use streamchat::transport::ConnectionState;
use streamchat_server::config::{ReplySettings, ServerConfig};
use streamchat_server::responder::CountingResponder;
use streamchat_server::server::{self, ServerState};

const RETRY: Duration = Duration::from_millis(400);

// =============================================================================
// TCP Proxy helper
// =============================================================================

/// Forwards TCP traffic from a client-facing port to the server. `kill()`
/// aborts every forwarding task, tearing down both ends of each connection.
struct TcpProxy {
    /// Port clients should connect to.
    port: u16,
    accept_handle: tokio::task::JoinHandle<()>,
    conn_handles: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl TcpProxy {
    /// Create a proxy on `port` (0 for any) forwarding to `backend_addr`.
    async fn new(port: u16, backend_addr: &str) -> Self {
        let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}"))
            .await
            .unwrap_or_else(|e| panic!("proxy: failed to bind to port {port}: {e}"));
        let port = listener.local_addr().unwrap().port();
        let backend = backend_addr.to_string();
        let conn_handles: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>> =
            Arc::new(Mutex::new(Vec::new()));
        let conn_handles_clone = Arc::clone(&conn_handles);

        let accept_handle = tokio::spawn(async move {
            while let Ok((mut client_stream, _)) = listener.accept().await {
                let backend = backend.clone();
                let conn_handle = tokio::spawn(async move {
                    let Ok(mut backend_stream) = tokio::net::TcpStream::connect(&backend).await
                    else {
                        return;
                    };
                    let _ = tokio::io::copy_bidirectional(&mut client_stream, &mut backend_stream)
                        .await;
                });
                conn_handles_clone.lock().push(conn_handle);
            }
        });

        Self {
            port,
            accept_handle,
            conn_handles,
        }
    }

    fn endpoint(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    /// Sever all connections and stop accepting new ones.
    fn kill(self) {
        self.accept_handle.abort();
        for h in self.conn_handles.lock().iter() {
            h.abort();
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn session_config() -> SessionConfig {
    SessionConfig {
        reveal_interval: Duration::from_millis(5),
        quiet_window: Duration::from_millis(250),
        retry_delay: RETRY,
        connect_timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}

/// Start a server whose replies stream slowly enough to interrupt.
async fn start_server() -> (std::net::SocketAddr, Arc<ServerState>) {
    let config = ServerConfig {
        reply: ReplySettings {
            chunk_chars: 2,
            chunk_delay: Duration::from_millis(40),
        },
        ..ServerConfig::default()
    };
    let state = Arc::new(ServerState::with_config(
        &config,
        Arc::new(CountingResponder),
    ));
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start server");
    (addr, state)
}

async fn wait_for(
    handle: &SessionHandle,
    what: &str,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut view = handle.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(10), view.wait_for(predicate))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .expect("session stopped");
    snapshot.clone()
}

const LONG: &str = "this reply is long enough to be cut off halfway through";

/// Send `LONG` and wait until part of the reply is visible.
async fn start_long_reply(handle: &SessionHandle) {
    handle.send(LONG).await.unwrap();
    wait_for(handle, "partial reply", |s| {
        s.last_reply().is_some_and(|m| m.text.chars().count() >= 6)
    })
    .await;
}

fn assert_cut_off(snapshot: &SessionSnapshot) {
    let reply = snapshot.last_reply().unwrap();
    assert!(!reply.active, "interrupted reply must be finalized");
    let full = format!("#1: {LONG}");
    assert!(full.starts_with(&reply.text), "partial text kept as-is");
    assert!(reply.text.len() < full.len(), "reply was not cut off");
    assert!(snapshot.messages.iter().all(|m| !m.active));
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn server_close_finalizes_partial_reply_and_reconnects() {
    let (addr, state) = start_server().await;
    let handle =
        net::spawn_session(session_config(), &format!("ws://{addr}/ws"), &ClientId::new("alice"))
            .unwrap();
    wait_for(&handle, "connection", |s| s.connected).await;

    start_long_reply(&handle).await;
    state.close_all_connections().await;

    let closed = wait_for(&handle, "close", |s| s.state == ConnectionState::Closed).await;
    let closed_at = Instant::now();
    assert!(!closed.connected);
    assert_cut_off(&closed);

    wait_for(&handle, "reconnection", |s| s.connected).await;
    assert!(
        closed_at.elapsed() >= RETRY - Duration::from_millis(50),
        "reconnected after {:?}, before the retry delay",
        closed_at.elapsed()
    );

    // History is kept server-side across connections.
    handle.send("again").await.unwrap();
    let snapshot = wait_for(&handle, "second reply", |s| {
        s.last_reply()
            .is_some_and(|m| !m.active && m.text == "#2: again")
    })
    .await;
    assert_eq!(snapshot.messages.len(), 4);

    handle.shutdown().await;
}

#[tokio::test]
async fn abrupt_disconnect_retries_until_server_returns() {
    let (addr, _state) = start_server().await;
    let proxy = TcpProxy::new(0, &addr.to_string()).await;
    let port = proxy.port;
    let handle =
        net::spawn_session(session_config(), &proxy.endpoint(), &ClientId::new("bob")).unwrap();
    wait_for(&handle, "connection", |s| s.connected).await;

    start_long_reply(&handle).await;
    proxy.kill();

    let closed = wait_for(&handle, "disconnect", |s| s.state == ConnectionState::Closed).await;
    assert_cut_off(&closed);

    // Let at least one retry fail against the dead port.
    tokio::time::sleep(RETRY * 2).await;
    assert!(!handle.view().connected);

    let _proxy = TcpProxy::new(port, &addr.to_string()).await;
    wait_for(&handle, "reconnection", |s| s.connected).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn manual_reconnect_replaces_live_connection() {
    let (addr, state) = start_server().await;
    let handle =
        net::spawn_session(session_config(), &format!("ws://{addr}/ws"), &ClientId::new("carol"))
            .unwrap();
    wait_for(&handle, "connection", |s| s.connected).await;

    start_long_reply(&handle).await;
    handle.reconnect().await;

    let snapshot = wait_for(&handle, "reconnection", |s| {
        s.connected && s.messages.iter().all(|m| !m.active)
    })
    .await;
    assert_cut_off(&snapshot);

    // The server sees one live connection for this client.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.connection_count().await, 1);

    handle.shutdown().await;
}
