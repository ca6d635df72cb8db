//! Bridge configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Missing or unparsable values fall
//! back to defaults; only an unusable WebSocket URI is rejected.

use std::time::Duration;

use crate::error::BridgeError;

/// Settings for the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Server URI, `ws://host:port/path`.
    pub uri: String,
    /// Delay before retrying after a failed connect or a dropped link.
    pub reconnect_interval: Duration,
    /// Connect timeout, and the idle period after which a silent link is
    /// treated as failed.
    pub network_timeout: Duration,
    /// Keepalive ping cadence while connected.
    pub ping_interval: Duration,
    /// Largest payload carried by a single data event.
    pub rx_chunk_size: usize,
    /// Outbound frames queued before `send` blocks.
    pub outbox_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let network_timeout = Duration::from_millis(10_000);
        Self {
            uri: "ws://127.0.0.1:8080".to_string(),
            reconnect_interval: Duration::from_millis(1_000),
            network_timeout,
            ping_interval: network_timeout / 2,
            rx_chunk_size: 1024,
            outbox_capacity: 32,
        }
    }
}

/// Settings for the stream adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Path prefix under which endpoints are opened (`<base>/<slot>`).
    pub base_path: String,
    /// Upper bound on a blocking endpoint write.
    pub send_timeout: Duration,
    /// Upper bound on a blocking endpoint read, and on backpressure.
    pub recv_timeout: Duration,
    /// Inbound buffer capacity in bytes.
    pub recv_buffer_capacity: usize,
    /// Outbound line buffer capacity in bytes.
    pub send_buffer_capacity: usize,
    /// Number of endpoint slots.
    pub max_slots: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            base_path: "/websocket".to_string(),
            send_timeout: Duration::from_millis(10_000),
            recv_timeout: Duration::from_millis(10_000),
            recv_buffer_capacity: 256,
            send_buffer_capacity: 256,
            max_slots: 4,
        }
    }
}

/// Settings for the console loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Prompt written before each line.
    pub prompt: String,
    /// Longest accepted command line, in bytes.
    pub max_line_len: usize,
    /// Most argv entries per line, command name included.
    pub max_args: usize,
    /// History entries kept by the line editor.
    pub history_len: usize,
    /// Print the greeting banner when the console starts.
    pub banner: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            prompt: "websocket> ".to_string(),
            max_line_len: 256,
            max_args: 8,
            history_len: 100,
            banner: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level bridge configuration.
///
/// Loaded once at startup via [`BridgeConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BridgeConfig {
    /// Connection settings.
    pub connection: ConnectionConfig,
    /// Stream adapter settings.
    pub adapter: AdapterConfig,
    /// Console settings.
    pub console: ConsoleConfig,
    /// Slot the console binds to.
    pub console_slot: usize,
    /// Log output format.
    pub log_format: LogFormat,
}

impl BridgeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] if `WS_URI` is not a
    /// `ws://` URI or a size/slot setting is zero or out of range.
    pub fn from_env() -> Result<Self, BridgeError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`BridgeConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key);

        let uri = get("WS_URI").unwrap_or(defaults.connection.uri);
        validate_uri(&uri)?;
        let network_timeout = parse_ms(&get, "WS_NETWORK_TIMEOUT_MS", 10_000);
        let connection = ConnectionConfig {
            uri,
            reconnect_interval: parse_ms(&get, "WS_RECONNECT_INTERVAL_MS", 1_000),
            network_timeout,
            ping_interval: get("WS_PING_INTERVAL_MS")
                .and_then(|v| v.parse().ok())
                .map_or(network_timeout / 2, Duration::from_millis),
            rx_chunk_size: parse(&get, "WS_RX_CHUNK_SIZE", 1024),
            outbox_capacity: parse(&get, "WS_OUTBOX_CAPACITY", 32),
        };

        let adapter = AdapterConfig {
            base_path: get("BRIDGE_BASE_PATH").unwrap_or(defaults.adapter.base_path),
            send_timeout: parse_ms(&get, "BRIDGE_SEND_TIMEOUT_MS", 10_000),
            recv_timeout: parse_ms(&get, "BRIDGE_RECV_TIMEOUT_MS", 10_000),
            recv_buffer_capacity: parse(&get, "BRIDGE_RECV_BUFFER_SIZE", 256),
            send_buffer_capacity: parse(&get, "BRIDGE_SEND_BUFFER_SIZE", 256),
            max_slots: parse(&get, "BRIDGE_MAX_SLOTS", 4),
        };

        let console = ConsoleConfig {
            prompt: get("CONSOLE_PROMPT").unwrap_or(defaults.console.prompt),
            max_line_len: parse(&get, "CONSOLE_MAX_LINE_LEN", 256),
            max_args: parse(&get, "CONSOLE_MAX_ARGS", 8),
            history_len: parse(&get, "CONSOLE_HISTORY_LEN", 100),
            banner: defaults.console.banner,
        };

        let console_slot = parse(&get, "BRIDGE_SLOT", 0);

        let log_format = match get("LOG_FORMAT").as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let config = Self {
            connection,
            adapter,
            console,
            console_slot,
            log_format,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), BridgeError> {
        let sizes = [
            ("WS_RX_CHUNK_SIZE", self.connection.rx_chunk_size),
            ("WS_OUTBOX_CAPACITY", self.connection.outbox_capacity),
            ("BRIDGE_RECV_BUFFER_SIZE", self.adapter.recv_buffer_capacity),
            ("BRIDGE_SEND_BUFFER_SIZE", self.adapter.send_buffer_capacity),
            ("BRIDGE_MAX_SLOTS", self.adapter.max_slots),
            ("CONSOLE_MAX_LINE_LEN", self.console.max_line_len),
            ("CONSOLE_MAX_ARGS", self.console.max_args),
        ];
        if let Some((key, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(BridgeError::InvalidConfig(format!("{key} must be non-zero")));
        }
        if self.console_slot >= self.adapter.max_slots {
            return Err(BridgeError::InvalidConfig(format!(
                "BRIDGE_SLOT {} must be below BRIDGE_MAX_SLOTS {}",
                self.console_slot, self.adapter.max_slots
            )));
        }
        Ok(())
    }
}

/// Rejects URIs the transport cannot dial.
fn validate_uri(uri: &str) -> Result<(), BridgeError> {
    let Some(rest) = uri.strip_prefix("ws://") else {
        return Err(BridgeError::InvalidConfig(format!(
            "WS_URI must start with ws://, got {uri}"
        )));
    };
    if rest.is_empty() || rest.starts_with('/') {
        return Err(BridgeError::InvalidConfig(format!(
            "WS_URI has no host: {uri}"
        )));
    }
    Ok(())
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse<T, F>(get: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Parses a millisecond duration variable.
fn parse_ms<F>(get: &F, key: &str, default_ms: u64) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    Duration::from_millis(parse(get, key, default_ms))
}
