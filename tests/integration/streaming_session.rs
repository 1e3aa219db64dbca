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

//! Integration tests for the streaming send/reveal/complete cycle.
//!
//! Each test runs a real `streamchat-server` on an OS-assigned port and a
//! real session over WebSocket, with timings shrunk so replies complete in
//! well under a second.

use std::sync::Arc;
use std::time::Duration;

use streamchat::config::SessionConfig;
use streamchat::identity::ClientId;
use streamchat::net::{self, SessionHandle};
use streamchat::session::controller::SendRejected;
use streamchat::session::{Author, SessionSnapshot};
use streamchat_server::config::{ReplySettings, ServerConfig};
use streamchat_server::responder::EchoResponder;
use streamchat_server::server::{self, ServerState};

// =============================================================================
// Helpers
// =============================================================================

fn fast_session() -> SessionConfig {
    SessionConfig {
        reveal_interval: Duration::from_millis(2),
        quiet_window: Duration::from_millis(200),
        retry_delay: Duration::from_millis(300),
        connect_timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}

async fn start_server(chunk_chars: usize, chunk_delay_ms: u64) -> (String, Arc<ServerState>) {
    let config = ServerConfig {
        reply: ReplySettings {
            chunk_chars,
            chunk_delay: Duration::from_millis(chunk_delay_ms),
        },
        ..ServerConfig::default()
    };
    let state = Arc::new(ServerState::with_config(&config, Arc::new(EchoResponder)));
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start server");
    (format!("ws://{addr}/ws"), state)
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

async fn connected_session(endpoint: &str, client: &str) -> SessionHandle {
    let handle = net::spawn_session(fast_session(), endpoint, &ClientId::new(client)).unwrap();
    wait_for(&handle, "connection", |s| s.connected).await;
    handle
}

fn finalized_reply(snapshot: &SessionSnapshot) -> Option<String> {
    snapshot
        .last_reply()
        .filter(|m| !m.active)
        .map(|m| m.text.clone())
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn reply_is_revealed_and_finalized() {
    let (endpoint, _state) = start_server(3, 5).await;
    let handle = connected_session(&endpoint, "alice").await;

    let exchange = handle.send("  hello there  ").await.unwrap();

    let snapshot = wait_for(&handle, "finalized reply", |s| {
        finalized_reply(s).is_some_and(|t| !t.is_empty())
    })
    .await;

    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[0].id, exchange.local);
    assert_eq!(snapshot.messages[0].author, Author::Local);
    assert_eq!(snapshot.messages[0].text, "hello there");
    assert_eq!(snapshot.messages[1].id, exchange.reply);
    assert_eq!(snapshot.messages[1].text, "hello there");
    assert!(!snapshot.typing);

    handle.shutdown().await;
}

#[tokio::test]
async fn typing_indicator_shows_until_first_character() {
    // The first fragment may already be revealed by the time we look.
    let (endpoint, _state) = start_server(3, 5).await;
    let handle = connected_session(&endpoint, "bob").await;

    handle.send("hi").await.unwrap();
    let view = handle.view();
    let reply = view.last_reply().unwrap();
    if reply.text.is_empty() {
        assert!(view.typing);
    }

    wait_for(&handle, "first character", |s| {
        s.last_reply().is_some_and(|m| !m.text.is_empty())
    })
    .await;
    assert!(!handle.view().typing);

    handle.shutdown().await;
}

#[tokio::test]
async fn empty_send_is_rejected_without_side_effects() {
    let (endpoint, state) = start_server(3, 5).await;
    let handle = connected_session(&endpoint, "carol").await;

    assert_eq!(handle.send("").await, Err(SendRejected::Empty));
    assert_eq!(handle.send(" \t\n").await, Err(SendRejected::Empty));
    assert!(handle.view().messages.is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(state.history.turns("carol").await.is_empty());

    handle.shutdown().await;
}

#[tokio::test]
async fn second_send_supersedes_streaming_reply() {
    let (endpoint, _state) = start_server(2, 30).await;
    let handle = connected_session(&endpoint, "dave").await;

    let first_text = "a fairly long reply that streams slowly";
    let first = handle.send(first_text).await.unwrap();
    wait_for(&handle, "partial reply", |s| {
        s.last_reply().is_some_and(|m| m.text.chars().count() >= 4)
    })
    .await;

    let second = handle.send("next").await.unwrap();
    let snapshot = handle.view();
    let first_reply = snapshot.messages.iter().find(|m| m.id == first.reply).unwrap();
    assert!(!first_reply.active);
    assert!(first_text.starts_with(&first_reply.text));
    assert!(first_reply.text.len() < first_text.len());
    assert_eq!(
        snapshot.messages.iter().filter(|m| m.active).count(),
        1,
        "only the new placeholder is active"
    );

    let snapshot = wait_for(&handle, "second reply", |s| {
        s.messages
            .iter()
            .any(|m| m.id == second.reply && !m.active && m.text.ends_with("next"))
    })
    .await;
    assert_eq!(snapshot.messages.len(), 4);

    handle.shutdown().await;
}

#[tokio::test]
async fn send_before_connect_is_rejected() {
    // Nothing listens on port 1, so the session never opens.
    let handle = net::spawn_session(fast_session(), "ws://127.0.0.1:1/ws", &ClientId::new("erin"))
        .unwrap();

    assert_eq!(handle.send("hi").await, Err(SendRejected::NotConnected));
    assert!(handle.view().messages.is_empty());

    handle.shutdown().await;
}

#[tokio::test]
async fn invalid_endpoint_is_reported_up_front() {
    let result = net::spawn_session(fast_session(), "http://127.0.0.1/ws", &ClientId::new("x"));
    assert!(result.is_err());
}
