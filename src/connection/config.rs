//! Engine Configuration
//!
//! Process-wide settings shared by every connection. They are loaded once at
//! startup (usually with [`EngineConfig::from_env`]) and passed by reference
//! into each [`ConnectionEngine`](crate::connection::ConnectionEngine).
//!
//! | Variable                        | Field                 | Default |
//! |---------------------------------|-----------------------|---------|
//! | `FLASHWIRE_TCP_BUFFER`          | `tcp_buffer_size`     | 65536   |
//! | `FLASHWIRE_DISABLE_TCP_NODELAY` | `disable_tcp_nodelay` | false   |
//! | `FLASHWIRE_MONITOR_SECS`        | `monitor_interval`    | 10      |

use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding [`EngineConfig::tcp_buffer_size`].
pub const ENV_TCP_BUFFER: &str = "FLASHWIRE_TCP_BUFFER";

/// Environment variable setting [`EngineConfig::disable_tcp_nodelay`].
pub const ENV_DISABLE_TCP_NODELAY: &str = "FLASHWIRE_DISABLE_TCP_NODELAY";

/// Environment variable overriding [`EngineConfig::monitor_interval`], in seconds.
pub const ENV_MONITOR_SECS: &str = "FLASHWIRE_MONITOR_SECS";

/// Default working buffer size (64 KB)
pub const DEFAULT_TCP_BUFFER: usize = 64 * 1024;

/// Kernel socket buffers are only forced at or above this size.
pub const SOCKET_BUFFER_THRESHOLD: usize = 64 * 1024;

/// Errors raised while loading configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// A variable was set but could not be parsed
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    /// The TCP buffer must hold at least one byte
    #[error("tcp buffer size must be non-zero")]
    ZeroBuffer,
}

/// Configuration for every connection engine in the process.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Size of the outbound working buffer; inbound gets one extra page
    pub tcp_buffer_size: usize,

    /// Leave Nagle's algorithm on (TCP no-delay is set by default)
    pub disable_tcp_nodelay: bool,

    /// Window over which throughput statistics are averaged (default: 10s)
    pub monitor_interval: Duration,

    /// OS page size used to pad the inbound buffer
    pub page_size: usize,

    /// SO_RCVBUF/SO_SNDBUF are set only when `tcp_buffer_size` reaches this
    pub socket_buffer_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tcp_buffer_size: DEFAULT_TCP_BUFFER,
            disable_tcp_nodelay: false,
            monitor_interval: Duration::from_secs(10),
            page_size: 4096,
            socket_buffer_threshold: SOCKET_BUFFER_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration from an arbitrary key lookup.
    ///
    /// Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_TCP_BUFFER) {
            config.tcp_buffer_size = parse_number(ENV_TCP_BUFFER, &value)?;
            if config.tcp_buffer_size == 0 {
                return Err(ConfigError::ZeroBuffer);
            }
        }

        if let Some(value) = lookup(ENV_DISABLE_TCP_NODELAY) {
            let normalized = value.trim().to_ascii_lowercase();
            config.disable_tcp_nodelay = match normalized.as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_DISABLE_TCP_NODELAY,
                        value,
                    })
                }
            };
        }

        if let Some(value) = lookup(ENV_MONITOR_SECS) {
            let secs: u64 = parse_number(ENV_MONITOR_SECS, &value)?;
            config.monitor_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Capacity of the inbound buffer.
    pub fn inbound_capacity(&self) -> usize {
        self.tcp_buffer_size + self.page_size
    }

    /// Capacity of the outbound buffer.
    pub fn outbound_capacity(&self) -> usize {
        self.tcp_buffer_size
    }

    /// Whether the kernel socket buffers should be resized.
    pub fn force_socket_buffers(&self) -> bool {
        self.tcp_buffer_size >= self.socket_buffer_threshold
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
