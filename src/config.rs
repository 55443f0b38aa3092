use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::{error::BridgeError, session::BridgeSession};

/// Default memory service root.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8765";
/// Default logical MCP client name.
pub const DEFAULT_CLIENT: &str = "claude";
/// Default memory owner.
pub const DEFAULT_USER_ID: &str = "default";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root URL of the memory service.
    pub base_url: String,
    /// Logical MCP client name used in the stream address.
    pub client: String,
    /// Owner of the memories read and written by this bridge.
    pub user_id: String,
    /// Full stream address; when present it overrides the three identity fields.
    pub sse_url: Option<String>,
    /// Runtime tuning shared by the lifecycle and the HTTP client.
    pub settings: BridgeSettings,
}

/// Timeouts, retry policy, and limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Upper bound for a single HTTP request to the memory service.
    pub request_timeout: Duration,
    /// Upper bound for establishing a TCP connection.
    pub connect_timeout: Duration,
    /// Upper bound for a whole tool invocation, retries included.
    pub call_timeout: Duration,
    /// Extra attempts granted to read-only tools after a timeout or transient failure.
    pub read_retries: u32,
    /// Linear backoff step between read retries.
    pub retry_backoff: Duration,
    /// Tool invocations admitted concurrently.
    pub max_in_flight: u32,
    /// `size` used by `get_memories` when the caller omits it.
    pub default_page_size: u32,
    /// Whether to hold the upstream event stream open.
    pub watch_stream: bool,
    /// Delay before reconnecting a dropped upstream stream.
    pub reconnect_delay: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(60),
            read_retries: 1,
            retry_backoff: Duration::from_millis(250),
            max_in_flight: 32,
            default_page_size: 10,
            watch_stream: false,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = BridgeSettings::default();
        let settings = BridgeSettings {
            request_timeout: load_secs("BRIDGE_REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
            connect_timeout: load_secs("BRIDGE_CONNECT_TIMEOUT_SECS", defaults.connect_timeout)?,
            call_timeout: load_secs("BRIDGE_CALL_TIMEOUT_SECS", defaults.call_timeout)?,
            read_retries: load_parsed("BRIDGE_READ_RETRIES")?.unwrap_or(defaults.read_retries),
            retry_backoff: load_parsed("BRIDGE_RETRY_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            max_in_flight: load_positive("BRIDGE_MAX_IN_FLIGHT", defaults.max_in_flight)?,
            default_page_size: load_positive(
                "BRIDGE_DEFAULT_PAGE_SIZE",
                defaults.default_page_size,
            )?,
            watch_stream: load_flag("BRIDGE_WATCH_STREAM")?.unwrap_or(defaults.watch_stream),
            reconnect_delay: load_secs("BRIDGE_RECONNECT_DELAY_SECS", defaults.reconnect_delay)?,
        };

        Ok(Self {
            base_url: load_env_optional("OPENMEMORY_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: load_env_optional("OPENMEMORY_CLIENT")
                .unwrap_or_else(|| DEFAULT_CLIENT.to_string()),
            user_id: load_env_optional("OPENMEMORY_USER_ID")
                .unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
            sse_url: load_env_optional("OPENMEMORY_SSE_URL"),
            settings,
        })
    }

    /// Resolve the session identity, preferring the full stream address when one is configured.
    pub fn session(&self) -> Result<BridgeSession, BridgeError> {
        match &self.sse_url {
            Some(url) => BridgeSession::from_stream_url(url),
            None => BridgeSession::new(&self.base_url, &self.client, &self.user_id),
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn load_secs(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    match load_parsed::<u64>(key)? {
        Some(0) => Err(ConfigError::InvalidValue(key.to_string())),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}

fn load_positive(key: &str, default: u32) -> Result<u32, ConfigError> {
    match load_parsed::<u32>(key)? {
        Some(0) => Err(ConfigError::InvalidValue(key.to_string())),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

fn load_flag(key: &str) -> Result<Option<bool>, ConfigError> {
    load_env_optional(key)
        .map(|value| match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        })
        .transpose()
}
