use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::codec::{self, CodecOptions};
use super::connection::{Connection, Endpoint};
use crate::config::{ConfigError, TransportConfig, DEFAULT_CONNECT_TIMEOUT, MAX_RETRY_WAIT};
use crate::record::Record;
use crate::transport::{Transport, TransportError};

/// An encoded message and the chunk id the collector must acknowledge.
struct Frame {
    bytes: Vec<u8>,
    chunk: Option<String>,
}

struct Inner {
    endpoint: Endpoint,
    config: TransportConfig,
    codec: CodecOptions,
    connection: Mutex<Option<Connection>>,
    closed: AtomicBool,
}

/// Fluentd Forward protocol client.
///
/// In synchronous mode each post is written on a blocking thread, retried
/// with a doubling wait, and returns once the collector has the message
/// (or acknowledged it, with `request_ack`). In asynchronous mode posts are
/// queued up to `buffer_limit` and written by a background task; a full
/// queue is reported as [`TransportError::QueueFull`].
///
/// The connection is opened on first use and reopened after any failure.
pub struct ForwardClient {
    inner: Arc<Inner>,
    queue: Mutex<Option<mpsc::Sender<Frame>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stop: CancellationToken,
}

impl ForwardClient {
    /// Validate `config` and, in async mode, start the sender task.
    ///
    /// No connection is attempted here.
    pub fn new(config: TransportConfig) -> Result<Self, ConfigError> {
        let endpoint = Endpoint::from_config(&config)?;
        let codec = CodecOptions {
            sub_second_precision: config.sub_second_precision,
            marshal_as_json: config.marshal_as_json,
        };
        let async_send = config.async_send;
        let buffer_limit = config.buffer_limit.max(1);

        let inner = Arc::new(Inner {
            endpoint,
            config,
            codec,
            connection: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        let stop = CancellationToken::new();

        let (queue, worker) = if async_send {
            let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
            let (tx, rx) = mpsc::channel(buffer_limit);
            let worker = runtime.spawn(run_sender(Arc::clone(&inner), rx, stop.clone()));
            (Some(tx), Some(worker))
        } else {
            (None, None)
        };

        Ok(Self {
            inner,
            queue: Mutex::new(queue),
            worker: Mutex::new(worker),
            stop,
        })
    }

    fn enqueue(&self, frame: Frame) -> Result<(), TransportError> {
        let queue = self.queue.lock();
        let sender = queue.as_ref().ok_or(TransportError::Closed)?;
        sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::QueueFull,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}

#[async_trait]
impl Transport for ForwardClient {
    async fn post_with_time(
        &self,
        tag: &str,
        time: DateTime<Utc>,
        record: Record,
    ) -> Result<(), TransportError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let tag = self.inner.full_tag(tag);
        let chunk = self
            .inner
            .config
            .request_ack
            .then(|| Uuid::new_v4().simple().to_string());
        let bytes = codec::encode_message(&tag, time, &record, chunk.as_deref(), self.inner.codec)?;
        let frame = Frame { bytes, chunk };

        if self.inner.config.async_send {
            return self.enqueue(frame);
        }

        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.send_with_retry(&frame))
            .await
            .map_err(|e| TransportError::Task(e.to_string()))?
    }

    /// Drain (or, with `force_stop_async_send`, discard) the async queue,
    /// then drop the connection. Later calls return `Ok(())`.
    async fn close(&self) -> Result<(), TransportError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if self.inner.config.force_stop_async_send {
            self.stop.cancel();
        }
        drop(self.queue.lock().take());

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker
                .await
                .map_err(|e| TransportError::Task(e.to_string()))?;
        }

        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.disconnect())
            .await
            .map_err(|e| TransportError::Task(e.to_string()))?;
        Ok(())
    }
}

impl fmt::Debug for ForwardClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardClient")
            .field("endpoint", &self.inner.endpoint.to_string())
            .field("async_send", &self.inner.config.async_send)
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl Inner {
    fn full_tag(&self, tag: &str) -> String {
        match self.config.tag_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}.{tag}"),
            _ => tag.to_string(),
        }
    }

    fn timeout(&self) -> Duration {
        if self.config.timeout.is_zero() {
            DEFAULT_CONNECT_TIMEOUT
        } else {
            self.config.timeout
        }
    }

    /// Up to `max_retry + 1` attempts, waiting `retry_wait`, then twice
    /// that, and so on up to [`MAX_RETRY_WAIT`] between them.
    fn send_with_retry(&self, frame: &Frame) -> Result<(), TransportError> {
        let attempts = self.config.max_retry.saturating_add(1);
        let mut wait = self.config.retry_wait;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.send_once(frame) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(
                        endpoint = %self.endpoint,
                        attempt,
                        error = %e,
                        "forward send failed"
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                std::thread::sleep(wait);
                wait = wait.saturating_mul(2).min(MAX_RETRY_WAIT);
            }
        }

        Err(TransportError::RetriesExhausted {
            attempts,
            last_error,
        })
    }

    /// The connection is put back only after a complete, acknowledged
    /// write, so a failed attempt always reconnects.
    fn send_once(&self, frame: &Frame) -> Result<(), TransportError> {
        let mut slot = self.connection.lock();
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.open()?,
        };

        conn.write_all(&frame.bytes)?;
        conn.flush()?;

        if let Some(chunk) = &frame.chunk {
            conn.set_read_timeout(Some(self.timeout()))?;
            let ack = codec::read_ack(&mut conn, self.codec.marshal_as_json)?;
            if &ack != chunk {
                return Err(TransportError::Ack {
                    expected: chunk.clone(),
                    actual: ack,
                });
            }
        }

        *slot = Some(conn);
        Ok(())
    }

    fn open(&self) -> Result<Connection, TransportError> {
        let conn = self.endpoint.connect(self.timeout())?;
        let write_timeout = self.config.write_timeout.filter(|t| !t.is_zero());
        conn.set_write_timeout(write_timeout)?;
        tracing::debug!(endpoint = %self.endpoint, "connected to collector");
        Ok(conn)
    }

    fn disconnect(&self) {
        if self.connection.lock().take().is_some() {
            tracing::debug!(endpoint = %self.endpoint, "disconnected from collector");
        }
    }
}

async fn run_sender(inner: Arc<Inner>, mut rx: mpsc::Receiver<Frame>, stop: CancellationToken) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                tracing::debug!(endpoint = %inner.endpoint, "async sender stopped, discarding queued messages");
                break;
            }
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let task_inner = Arc::clone(&inner);
        let result = tokio::task::spawn_blocking(move || task_inner.send_with_retry(&frame)).await;
        let error = match result {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };

        tracing::warn!(endpoint = %inner.endpoint, error = %error, "dropping log message after failed delivery");

        let interval = inner.config.async_reconnect_interval;
        if !interval.is_zero() {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}
