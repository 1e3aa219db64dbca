//! `StreamChat` development server library.
//!
//! Exposes the server for use in tests and embedding. The server accepts
//! WebSocket connections at `/ws/{client_id}`, keeps a bounded history per
//! client id, and streams each reply back as a series of text fragments.

pub mod config;
pub mod history;
pub mod responder;
pub mod server;
