use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::level::Level;

/// Routing tag used when the caller leaves [`LoggerConfig::tag`] empty.
pub const DEFAULT_TAG: &str = "app.logs";
/// Shutdown deadline used when [`LoggerConfig::shutdown_timeout`] is zero.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
/// Default capacity of the logger's record queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
const MIN_CHANNEL_CAPACITY: usize = 16;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 24224;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BUFFER_LIMIT: usize = 8192;
pub const DEFAULT_MAX_RETRY: u32 = 13;
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(500);
/// Upper bound for the doubling wait between send attempts.
pub const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);

/// Error returned when a logger or transport cannot be built from its
/// configuration. No handle is created when this is returned.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("unknown network {0:?}, expected one of tcp, tls, unix")]
    UnknownNetwork(String),

    #[error("a socket path is required for the unix network")]
    MissingSocketPath,

    #[error("tls network requested but the `tls` feature is disabled")]
    TlsDisabled,

    #[error("failed to build TLS connector: {0}")]
    Tls(String),

    #[error("log forwarder must be started from within a tokio runtime")]
    NoRuntime,
}

/// Socket family used to reach the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Tls,
    Unix,
}

impl Network {
    pub const fn as_str(self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Tls => "tls",
            Network::Unix => "unix",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "tls" => Ok(Network::Tls),
            "unix" => Ok(Network::Unix),
            other => Err(ConfigError::UnknownNetwork(other.to_string())),
        }
    }
}

/// How `Duration` fields are written into encoded records.
///
/// Pick one per deployment so that the collector sees a consistent type
/// for every duration-valued field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurationFormat {
    /// Human readable string, e.g. `"1s 500ms"`.
    #[default]
    String,
    /// Decimal seconds, e.g. `1.5`.
    Seconds,
}

/// What a log call does when the logger's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait for room, so the caller is slowed down to the pace of the
    /// transport. On a current-thread runtime, where waiting would stall
    /// the delivery task itself, the record is dropped instead.
    #[default]
    Block,
    /// Drop the record immediately. Drops are reported by the next
    /// flush or close.
    Drop,
}

/// Parameters of the Forward protocol client.
///
/// `network` is kept as the raw string the operator supplied; it is
/// validated when the client is constructed so that a bad value is
/// reported as a [`ConfigError`] before any handle exists.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// `"tcp"`, `"tls"` or `"unix"`.
    pub network: String,
    pub host: String,
    pub port: u16,
    /// Required when `network` is `"unix"`.
    pub socket_path: Option<PathBuf>,
    /// Connect timeout, also used while waiting for acknowledgements.
    pub timeout: Duration,
    pub write_timeout: Option<Duration>,
    /// Capacity of the pending queue in async mode.
    pub buffer_limit: usize,
    /// Number of retries after the first failed attempt.
    pub max_retry: u32,
    /// Initial wait between attempts, doubled each time up to [`MAX_RETRY_WAIT`].
    pub retry_wait: Duration,
    /// Queue messages and deliver them from a background task.
    pub async_send: bool,
    /// Discard queued messages on close instead of draining them.
    pub force_stop_async_send: bool,
    /// Encode the event time as a Forward `EventTime` with nanoseconds.
    pub sub_second_precision: bool,
    pub marshal_as_json: bool,
    pub request_ack: bool,
    pub tls_insecure_skip_verify: bool,
    /// Pause after a failed delivery in async mode before the next message.
    pub async_reconnect_interval: Duration,
    /// Prepended to every tag as `prefix.tag`.
    pub tag_prefix: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            network: Network::Tcp.as_str().to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            socket_path: None,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: None,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            max_retry: DEFAULT_MAX_RETRY,
            retry_wait: DEFAULT_RETRY_WAIT,
            async_send: false,
            force_stop_async_send: false,
            sub_second_precision: false,
            marshal_as_json: false,
            request_ack: false,
            tls_insecure_skip_verify: false,
            async_reconnect_interval: Duration::ZERO,
            tag_prefix: None,
        }
    }
}

/// Configuration of a [`ForwardLogger`](crate::handle::ForwardLogger).
///
/// An empty `tag`, a zero `shutdown_timeout` or a zero `channel_capacity`
/// resolve to the crate defaults.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Routing key the collector publishes records under.
    pub tag: String,
    /// Deadline for closing the transport during shutdown.
    pub shutdown_timeout: Duration,
    /// Minimum level, parsed with [`Level::parse_or_default`].
    pub level: String,
    pub duration_format: DurationFormat,
    /// Records the logger may queue ahead of the sink.
    pub channel_capacity: usize,
    pub overflow: OverflowPolicy,
    pub transport: TransportConfig,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            tag: DEFAULT_TAG.to_string(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            level: Level::Debug.as_str().to_string(),
            duration_format: DurationFormat::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            overflow: OverflowPolicy::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl LoggerConfig {
    pub fn resolved_tag(&self) -> &str {
        if self.tag.is_empty() {
            DEFAULT_TAG
        } else {
            &self.tag
        }
    }

    pub fn resolved_shutdown_timeout(&self) -> Duration {
        if self.shutdown_timeout.is_zero() {
            DEFAULT_SHUTDOWN_TIMEOUT
        } else {
            self.shutdown_timeout
        }
    }

    pub fn resolved_channel_capacity(&self) -> usize {
        if self.channel_capacity == 0 {
            DEFAULT_CHANNEL_CAPACITY
        } else {
            self.channel_capacity.max(MIN_CHANNEL_CAPACITY)
        }
    }

    pub fn min_level(&self) -> Level {
        Level::parse_or_default(&self.level)
    }
}
