//! Leveled, structured logging API.
//!
//! Log calls are filtered by level, encoded on the calling thread and then
//! handed to a bounded queue. A single background task drains the queue
//! into the [`FluentSink`], so records from one thread reach the sink in
//! the order they were logged. When the queue is full the
//! [`OverflowPolicy`] decides whether the caller waits or the record is
//! dropped; drops are reported by the next flush.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::config::OverflowPolicy;
use crate::encoder::{Encoder, Entry};
use crate::level::Level;
use crate::record::FieldValue;
use crate::sink::FluentSink;

/// Error reported when flushing or closing the logger.
#[derive(thiserror::Error, Debug)]
pub enum FacadeError {
    #[error(
        "{failed} log record(s) could not be written to the sink ({dropped} more dropped), last error: {last_error}"
    )]
    Undelivered {
        failed: u64,
        dropped: u64,
        last_error: String,
    },

    #[error("{dropped} log record(s) were dropped before reaching the sink")]
    Dropped { dropped: u64 },

    #[error("log worker has stopped")]
    WorkerStopped,
}

/// Counters describing what happened to log calls so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggerStats {
    /// Records accepted into the queue.
    pub emitted: u64,
    /// Records discarded because the queue was full or the logger closed.
    pub dropped: u64,
    /// Records the sink refused.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    emitted: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    /// Drops not yet reported by a flush.
    unreported_drops: AtomicU64,
}

type Ack = oneshot::Sender<Option<FacadeError>>;

enum Command {
    Record(Vec<u8>),
    Flush(Ack),
    Close(Ack),
}

struct Shared {
    level: Level,
    encoder: Encoder,
    overflow: OverflowPolicy,
    sender: mpsc::Sender<Command>,
    closing: AtomicBool,
    counters: Arc<Counters>,
}

/// Cheap to clone; all clones and children share one queue.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
    name: Option<Arc<str>>,
    context: Arc<Vec<(String, FieldValue)>>,
}

impl Logger {
    /// Create a logger and spawn its delivery task on `runtime`.
    pub(crate) fn spawn(
        sink: Arc<FluentSink>,
        level: Level,
        encoder: Encoder,
        capacity: usize,
        overflow: OverflowPolicy,
        runtime: &Handle,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let counters = Arc::new(Counters::default());
        runtime.spawn(run_worker(sink, rx, Arc::clone(&counters)));

        Self {
            shared: Arc::new(Shared {
                level,
                encoder,
                overflow,
                sender: tx,
                closing: AtomicBool::new(false),
                counters,
            }),
            name: None,
            context: Arc::new(Vec::new()),
        }
    }

    pub fn level(&self) -> Level {
        self.shared.level
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.shared.level
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Child logger whose records carry `name` under the `logger` key.
    /// Names of nested children are joined with `.`.
    pub fn named(&self, name: &str) -> Self {
        let name: Arc<str> = match &self.name {
            Some(parent) => format!("{parent}.{name}").into(),
            None => name.into(),
        };
        Self {
            name: Some(name),
            ..self.clone()
        }
    }

    /// Child logger that adds `fields` to every record it emits.
    pub fn with(&self, fields: &[(&str, FieldValue)]) -> Self {
        let mut context = Vec::with_capacity(self.context.len() + fields.len());
        context.extend(self.context.iter().cloned());
        context.extend(fields.iter().map(|(k, v)| ((*k).to_string(), v.clone())));
        Self {
            context: Arc::new(context),
            ..self.clone()
        }
    }

    pub fn debug(&self, message: &str, fields: &[(&str, FieldValue)]) {
        self.log(Level::Debug, message, fields);
    }

    pub fn info(&self, message: &str, fields: &[(&str, FieldValue)]) {
        self.log(Level::Info, message, fields);
    }

    pub fn warn(&self, message: &str, fields: &[(&str, FieldValue)]) {
        self.log(Level::Warn, message, fields);
    }

    pub fn error(&self, message: &str, fields: &[(&str, FieldValue)]) {
        self.log(Level::Error, message, fields);
    }

    /// Log `message` at `level`. Calls below the minimum level return
    /// before anything is encoded.
    pub fn log(&self, level: Level, message: &str, fields: &[(&str, FieldValue)]) {
        if !self.enabled(level) {
            return;
        }

        let encoder = &self.shared.encoder;
        let fields = self
            .context
            .iter()
            .map(|(key, value)| (key.as_str(), value))
            .chain(fields.iter().map(|(key, value)| (*key, value)))
            .map(|(key, value)| (key, encoder.encode_value(value)));

        self.emit(level, message, self.name.as_deref(), fields);
    }

    /// Encode and enqueue a record whose level has already been checked.
    pub(crate) fn emit<K, I>(&self, level: Level, message: &str, logger: Option<&str>, fields: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let entry = Entry {
            time: Utc::now(),
            level,
            logger,
            message,
        };

        match self.shared.encoder.encode(&entry, fields) {
            Ok(bytes) => self.enqueue(bytes),
            Err(_) => self.record_drop(),
        }
    }

    fn enqueue(&self, bytes: Vec<u8>) {
        if self.shared.closing.load(Ordering::Acquire) {
            self.record_drop();
            return;
        }

        let command = match self.shared.sender.try_send(Command::Record(bytes)) {
            Ok(()) => return self.record_emit(),
            Err(TrySendError::Closed(_)) => return self.record_drop(),
            Err(TrySendError::Full(command)) => command,
        };

        if self.shared.overflow == OverflowPolicy::Block && self.send_blocking(command) {
            self.record_emit();
        } else {
            self.record_drop();
        }
    }

    /// Wait for room in the queue. Returns false when the record could
    /// not be queued.
    fn send_blocking(&self, command: Command) -> bool {
        let sender = &self.shared.sender;
        match Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::CurrentThread => false,
                _ => tokio::task::block_in_place(|| sender.blocking_send(command).is_ok()),
            },
            Err(_) => sender.blocking_send(command).is_ok(),
        }
    }

    fn record_emit(&self) {
        self.shared.counters.emitted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_drop(&self) {
        let counters = &self.shared.counters;
        counters.dropped.fetch_add(1, Ordering::Relaxed);
        counters.unreported_drops.fetch_add(1, Ordering::AcqRel);
    }

    pub fn stats(&self) -> LoggerStats {
        let counters = &self.shared.counters;
        LoggerStats {
            emitted: counters.emitted.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Wait until every record queued before this call has been handed to
    /// the sink.
    ///
    /// **Returns**
    /// - [`FacadeError::Undelivered`] if any write since the previous
    ///   flush failed.
    /// - [`FacadeError::Dropped`] if records were dropped since the
    ///   previous flush.
    /// - [`FacadeError::WorkerStopped`] after [`close`](Logger::close).
    pub async fn flush(&self) -> Result<(), FacadeError> {
        self.request(Command::Flush).await
    }

    /// Final flush. Afterwards the delivery task exits and every log call
    /// is dropped.
    pub async fn close(&self) -> Result<(), FacadeError> {
        self.shared.closing.store(true, Ordering::Release);
        self.request(Command::Close).await
    }

    async fn request(&self, command: fn(Ack) -> Command) -> Result<(), FacadeError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.shared
            .sender
            .send(command(ack_tx))
            .await
            .map_err(|_| FacadeError::WorkerStopped)?;

        match ack_rx.await {
            Ok(None) => Ok(()),
            Ok(Some(err)) => Err(err),
            Err(_) => Err(FacadeError::WorkerStopped),
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.shared.level)
            .field("name", &self.name)
            .field("context_fields", &self.context.len())
            .finish()
    }
}

async fn run_worker(sink: Arc<FluentSink>, mut rx: mpsc::Receiver<Command>, counters: Arc<Counters>) {
    let mut failed = 0u64;
    let mut last_error: Option<String> = None;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Record(bytes) => {
                if let Err(e) = sink.write(&bytes).await {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    failed += 1;
                    tracing::debug!(tag = sink.tag(), error = %e, "log record was not delivered");
                    last_error = Some(e.to_string());
                }
            }
            Command::Flush(ack) => {
                let _ = ack.send(take_failure(&mut failed, &mut last_error, &counters));
            }
            Command::Close(ack) => {
                let _ = ack.send(take_failure(&mut failed, &mut last_error, &counters));
                break;
            }
        }
    }
}

fn take_failure(
    failed: &mut u64,
    last_error: &mut Option<String>,
    counters: &Counters,
) -> Option<FacadeError> {
    let dropped = counters.unreported_drops.swap(0, Ordering::AcqRel);
    let failed = std::mem::take(failed);
    match last_error.take() {
        Some(last_error) => Some(FacadeError::Undelivered {
            failed,
            dropped,
            last_error,
        }),
        None if dropped > 0 => Some(FacadeError::Dropped { dropped }),
        None => None,
    }
}
