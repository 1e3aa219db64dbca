//! `StreamChat` development server.
//!
//! An axum WebSocket server that answers each client message and streams the
//! reply back in small fragments, the way a language-model backend would.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8000
//! cargo run --bin streamchat-server
//!
//! # Slow, word-sized fragments
//! cargo run --bin streamchat-server -- --chunk-chars 6 --chunk-delay-ms 150
//! ```

use std::sync::Arc;

use clap::Parser;
use streamchat_server::config::{ServerCliArgs, ServerConfig};
use streamchat_server::responder::EchoResponder;
use streamchat_server::server::{self, ServerState};

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        chunk_chars = config.reply.chunk_chars,
        "starting streamchat server"
    );

    let state = Arc::new(ServerState::with_config(&config, Arc::new(EchoResponder)));

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
