//! `StreamChat`: line-oriented streaming chat client.
//!
//! Reads lines from stdin, sends each one to the backend, and prints replies
//! as they are revealed. Configuration via CLI flags, environment variables,
//! or config file (`~/.config/streamchat/config.toml`).
//!
//! ```bash
//! # Connect to a local backend on the default endpoint
//! cargo run --bin streamchat
//!
//! # Custom endpoint and a slower reveal
//! cargo run --bin streamchat -- --endpoint ws://127.0.0.1:9000/ws --char-delay-ms 60
//! ```
//!
//! Commands: `/quit` exits, `/reconnect` re-opens the connection.

use std::io;
use std::path::Path;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use streamchat::config::{CliArgs, ClientConfig};
use streamchat::identity;
use streamchat::net::{self, SessionHandle};
use streamchat::session::controller::SendRejected;
use streamchat::ui::TranscriptPrinter;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > config file > env > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file so they never interleave with the transcript.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("streamchat starting");

    let client_id = match identity::resolve(
        config.client_id.as_deref(),
        config.identity_file.as_deref(),
    ) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Warning: {e}; using a temporary client id");
            identity::ClientId::generate()
        }
    };
    tracing::info!(client_id = %client_id, endpoint = %config.endpoint, "resolved identity");

    let handle = match net::spawn_session(config.session.clone(), &config.endpoint, &client_id) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = run_client(&handle).await;
    handle.shutdown().await;

    tracing::info!("streamchat exiting");
    result
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("streamchat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Main loop: forward stdin lines and render snapshots until `/quit` or EOF.
async fn run_client(handle: &SessionHandle) -> io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut view = handle.subscribe();
    let mut printer = TranscriptPrinter::new();
    let mut stdout = io::stdout();

    printer.render(&view.borrow_and_update(), &mut stdout)?;

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    // Session task is gone.
                    return Ok(());
                }
                let snapshot = view.borrow_and_update().clone();
                printer.render(&snapshot, &mut stdout)?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                match line.trim() {
                    "/quit" => return Ok(()),
                    "/reconnect" => handle.reconnect().await,
                    _ => match handle.send(&line).await {
                        Ok(_) | Err(SendRejected::Empty) => {}
                        Err(SendRejected::NotConnected) => {
                            eprintln!("-- not connected, message not sent");
                        }
                        Err(SendRejected::Stopped) => return Ok(()),
                    },
                }
            }
        }
    }
}
