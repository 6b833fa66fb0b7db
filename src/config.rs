//! IPC configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). The hub reads the listen address, frame limits, idle
//! timeout and default topics; clients read the target URL.

use std::net::SocketAddr;
use std::time::Duration;

/// Broadcast topics every hub connection starts subscribed to.
pub const DEFAULT_TOPICS: [&str; 4] = [
    "monitor-info-response",
    "appd-application-list-response",
    "appd-application-added",
    "mouse-position-update",
];

/// Top-level IPC configuration.
///
/// Loaded once at startup via [`IpcConfig::from_env`].
#[derive(Debug, Clone)]
pub struct IpcConfig {
    /// Socket address the hub binds to (e.g. `127.0.0.1:7000`).
    pub listen_addr: SocketAddr,

    /// URL clients connect to (e.g. `ws://127.0.0.1:7000/ws`).
    pub url: String,

    /// Largest inbound frame the hub accepts, in bytes.
    pub max_message_bytes: usize,

    /// Capacity of the hub's broadcast channel.
    pub broadcast_capacity: usize,

    /// Seconds without inbound traffic before the hub closes a
    /// connection. Zero disables the timeout.
    pub idle_timeout_secs: u64,

    /// Topics a new hub connection receives broadcasts for.
    pub default_topics: Vec<String>,

    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            url: format!("ws://127.0.0.1:{DEFAULT_PORT}/ws"),
            max_message_bytes: 16 * 1024 * 1024,
            broadcast_capacity: 1024,
            idle_timeout_secs: 60,
            default_topics: DEFAULT_TOPICS.iter().map(ToString::to_string).collect(),
            log_json: false,
        }
    }
}

const DEFAULT_PORT: u16 = 7000;

impl IpcConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to the [`Default`] values when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `SHELL_IPC_LISTEN_ADDR` is set but cannot be
    /// parsed as a [`SocketAddr`].
    pub fn from_env() -> Result<Self, std::net::AddrParseError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr = match std::env::var("SHELL_IPC_LISTEN_ADDR") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.listen_addr,
        };

        let url = std::env::var("SHELL_IPC_URL").unwrap_or(defaults.url);
        let max_message_bytes =
            parse_env("SHELL_IPC_MAX_MESSAGE_BYTES", defaults.max_message_bytes);
        let broadcast_capacity =
            parse_env("SHELL_IPC_BROADCAST_CAPACITY", defaults.broadcast_capacity).max(1);
        let idle_timeout_secs =
            parse_env("SHELL_IPC_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs);
        let default_topics = std::env::var("SHELL_IPC_DEFAULT_TOPICS")
            .map(|raw| parse_list(&raw))
            .unwrap_or(defaults.default_topics);
        let log_json = parse_env_bool("SHELL_IPC_LOG_JSON", defaults.log_json);

        Ok(Self {
            listen_addr,
            url,
            max_message_bytes,
            broadcast_capacity,
            idle_timeout_secs,
            default_topics,
            log_json,
        })
    }

    /// Idle timeout for hub connections, `None` when disabled.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

/// Splits a comma-separated list, trimming entries and skipping empty ones.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"`. Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("TRUE") | Some("1") => true,
        Some("false") | Some("FALSE") | Some("0") => false,
        _ => default,
    }
}
