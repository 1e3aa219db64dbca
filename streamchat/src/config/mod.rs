//! Configuration system for the `StreamChat` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/streamchat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    connection: ConnectionFileConfig,
    reveal: RevealFileConfig,
    identity: IdentityFileConfig,
}

/// `[connection]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConnectionFileConfig {
    endpoint: Option<String>,
    connect_timeout_secs: Option<u64>,
    retry_delay_ms: Option<u64>,
    channel_capacity: Option<usize>,
}

/// `[reveal]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RevealFileConfig {
    char_delay_ms: Option<u64>,
    quiet_window_ms: Option<u64>,
    drain_recheck_factor: Option<u32>,
}

/// `[identity]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct IdentityFileConfig {
    client_id: Option<String>,
    file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Timing and capacity settings consumed by the session controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Interval between revealed characters.
    pub reveal_interval: Duration,
    /// Silence after the last fragment before a reply may be finalized.
    pub quiet_window: Duration,
    /// Multiple of `reveal_interval` between drain rechecks.
    pub drain_recheck_factor: u32,
    /// Delay before reconnecting after the connection is lost.
    pub retry_delay: Duration,
    /// Timeout for the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Capacity of the command and link-event channels.
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reveal_interval: Duration::from_millis(30),
            quiet_window: Duration::from_millis(1500),
            drain_recheck_factor: 5,
            retry_delay: Duration::from_millis(5000),
            connect_timeout: Duration::from_secs(10),
            channel_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Interval between completion rechecks while the reveal is draining.
    #[must_use]
    pub fn drain_recheck(&self) -> Duration {
        self.reveal_interval * self.drain_recheck_factor.max(1)
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Connection --
    /// Base WebSocket URL; the client id is appended as the last path segment.
    pub endpoint: String,

    // -- Identity --
    /// Explicit client id, overriding the persisted one.
    pub client_id: Option<String>,
    /// File holding the persisted client id (platform data dir if `None`).
    pub identity_file: Option<PathBuf>,

    // -- Session --
    /// Reveal, completion, and reconnect settings.
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8000/ws".to_string(),
            client_id: None,
            identity_file: None,
            session: SessionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// Otherwise the default path (`~/.config/streamchat/config.toml`) is
    /// tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. This is separated from `load()` to
    /// enable unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let session = defaults.session;

        Self {
            endpoint: cli
                .endpoint
                .clone()
                .or_else(|| file.connection.endpoint.clone())
                .unwrap_or(defaults.endpoint),
            client_id: cli
                .client_id
                .clone()
                .or_else(|| file.identity.client_id.clone()),
            identity_file: cli
                .identity_file
                .clone()
                .or_else(|| file.identity.file.clone()),
            session: SessionConfig {
                reveal_interval: cli
                    .char_delay_ms
                    .or(file.reveal.char_delay_ms)
                    .map_or(session.reveal_interval, Duration::from_millis),
                quiet_window: cli
                    .quiet_window_ms
                    .or(file.reveal.quiet_window_ms)
                    .map_or(session.quiet_window, Duration::from_millis),
                drain_recheck_factor: file
                    .reveal
                    .drain_recheck_factor
                    .unwrap_or(session.drain_recheck_factor),
                retry_delay: cli
                    .retry_delay_ms
                    .or(file.connection.retry_delay_ms)
                    .map_or(session.retry_delay, Duration::from_millis),
                connect_timeout: file
                    .connection
                    .connect_timeout_secs
                    .map_or(session.connect_timeout, Duration::from_secs),
                channel_capacity: file
                    .connection
                    .channel_capacity
                    .unwrap_or(session.channel_capacity),
            },
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Streaming chat client with paced typewriter reveal")]
pub struct CliArgs {
    /// Base WebSocket URL of the chat backend.
    #[arg(long, env = "STREAMCHAT_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Client id to present instead of the persisted one.
    #[arg(long, env = "STREAMCHAT_CLIENT_ID")]
    pub client_id: Option<String>,

    /// File holding the persisted client id.
    #[arg(long)]
    pub identity_file: Option<PathBuf>,

    /// Delay between revealed characters, in milliseconds.
    #[arg(long)]
    pub char_delay_ms: Option<u64>,

    /// Silence before a reply is considered complete, in milliseconds.
    #[arg(long)]
    pub quiet_window_ms: Option<u64>,

    /// Delay before reconnecting, in milliseconds.
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Path to config file (default: `~/.config/streamchat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "STREAMCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/streamchat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("streamchat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
