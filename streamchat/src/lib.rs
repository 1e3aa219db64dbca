//! `StreamChat`: streaming chat client with a paced typewriter reveal.
//!
//! The client keeps one WebSocket connection to a chat backend, sends typed
//! messages, and reveals each streamed reply one character at a time. A reply
//! is considered complete once the backend has been quiet for a while and the
//! reveal has caught up.

pub mod config;
pub mod identity;
pub mod net;
pub mod session;
pub mod transport;
pub mod ui;
