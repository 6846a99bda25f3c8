use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{ConfigError, TransportConfig};
use crate::forward::ForwardClient;
use crate::record::Record;

/// Network client that delivers tagged, timestamped records to a remote
/// collector.
///
/// Implementations own their connection state, buffering and retry policy.
/// The sink only ever calls [`post_with_time`](Transport::post_with_time)
/// and [`close`](Transport::close), which makes it easy to substitute a
/// fake in tests or a different collector protocol.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one record under `tag`.
    ///
    /// **Returns**
    /// - `Ok(())` once the record was sent (synchronous clients) or queued
    ///   (asynchronous clients).
    /// - `Err(..)` if the record was rejected. The caller does not retry.
    async fn post_with_time(
        &self,
        tag: &str,
        time: DateTime<Utc>,
        record: Record,
    ) -> Result<(), TransportError>;

    /// Flush whatever is still buffered and release the connection.
    ///
    /// There is no way to cancel a close in progress; callers that need a
    /// deadline race it against a timer and let it finish on its own.
    async fn close(&self) -> Result<(), TransportError>;
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("connection to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("unexpected ack: expected {expected}, got {actual}")]
    Ack { expected: String, actual: String },

    #[error("all {attempts} send attempts failed: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("async send queue is full")]
    QueueFull,

    #[error("transport task failed: {0}")]
    Task(String),
}

/// Build the transport described by `config`.
///
/// Fails with a [`ConfigError`] for an unrecognized network, a unix
/// network without a socket path, or a TLS network when TLS support is
/// not compiled in.
pub fn make_transport(config: &TransportConfig) -> Result<Arc<dyn Transport>, ConfigError> {
    let client = ForwardClient::new(config.clone())?;
    Ok(Arc::new(client) as Arc<dyn Transport>)
}
