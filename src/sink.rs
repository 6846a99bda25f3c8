use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::record::Record;
use crate::transport::{Transport, TransportError};

/// Error returned by [`FluentSink`] operations.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("log sink is closed")]
    Closed,

    #[error("log decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("log delivery failed: {0}")]
    Delivery(#[from] TransportError),

    #[error("log flush timed out after {0:?}")]
    FlushTimeout(Duration),
}

/// Write endpoint between the logger and the [`Transport`].
///
/// Each write is one encoded JSON record. It is decoded back into a
/// [`Record`] and posted under the configured tag with the current time.
/// Once [`flush_and_close`](FluentSink::flush_and_close) has started, every
/// write fails with [`SinkError::Closed`].
pub struct FluentSink {
    transport: Arc<dyn Transport>,
    tag: String,
    closed: AtomicBool,
}

impl FluentSink {
    pub fn new(transport: Arc<dyn Transport>, tag: impl Into<String>) -> Self {
        Self {
            transport,
            tag: tag.into(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Forward one encoded record.
    ///
    /// **Returns**
    /// - `Ok(buf.len())` when the transport accepted the record. Writes are
    ///   all-or-nothing.
    /// - [`SinkError::Closed`] after shutdown started.
    /// - [`SinkError::Decode`] if `buf` is not a JSON object.
    /// - [`SinkError::Delivery`] if the transport rejected the record.
    ///
    /// Only the flag check is shared with other callers; the transport call
    /// itself runs without any lock held.
    pub async fn write(&self, buf: &[u8]) -> Result<usize, SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }

        let record: Record = serde_json::from_slice(buf)?;
        self.transport
            .post_with_time(&self.tag, Utc::now(), record)
            .await?;

        Ok(buf.len())
    }

    /// Mark the sink closed and close the transport within `deadline`.
    ///
    /// Only the first call does any work; later calls return `Ok(())`.
    /// When the deadline passes first, [`SinkError::FlushTimeout`] is
    /// returned while the transport close keeps running in the background
    /// until it completes.
    pub async fn flush_and_close(&self, deadline: Duration) -> Result<(), SinkError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let transport = Arc::clone(&self.transport);
        let close = tokio::spawn(async move { transport.close().await });

        match tokio::time::timeout(deadline, close).await {
            Ok(Ok(result)) => result.map_err(SinkError::Delivery),
            Ok(Err(join_error)) => Err(SinkError::Delivery(TransportError::Task(
                join_error.to_string(),
            ))),
            Err(_) => {
                tracing::warn!(
                    tag = %self.tag,
                    ?deadline,
                    "transport close did not finish in time, continuing in background"
                );
                Err(SinkError::FlushTimeout(deadline))
            }
        }
    }
}

impl std::fmt::Debug for FluentSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FluentSink")
            .field("tag", &self.tag)
            .field("closed", &self.is_closed())
            .finish()
    }
}
