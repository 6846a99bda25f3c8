//! The owning handle: transport, sink and logger composed into one value
//! with a one-shot, bounded shutdown.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::config::{ConfigError, LoggerConfig};
use crate::encoder::Encoder;
use crate::layer::ForwardLayer;
use crate::logger::{FacadeError, Logger};
use crate::sink::{FluentSink, SinkError};
use crate::transport::{make_transport, Transport};

/// Outcome of a failed [`ForwardLogger::close`].
///
/// Both phases are kept. The logger flush error takes precedence for
/// `Display` and [`source`](Error::source); the transport error stays
/// available through [`ShutdownError::transport`].
#[derive(Debug, Clone)]
pub struct ShutdownError {
    facade: Option<Arc<FacadeError>>,
    transport: Option<Arc<SinkError>>,
}

impl ShutdownError {
    pub fn facade(&self) -> Option<&FacadeError> {
        self.facade.as_deref()
    }

    pub fn transport(&self) -> Option<&SinkError> {
        self.transport.as_deref()
    }

    /// True when the transport close ran past the shutdown timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self.transport(), Some(SinkError::FlushTimeout(_)))
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.facade, &self.transport) {
            (Some(facade), Some(transport)) => write!(
                f,
                "logger flush failed: {facade} (transport close also failed: {transport})"
            ),
            (Some(facade), None) => write!(f, "logger flush failed: {facade}"),
            (None, Some(transport)) => write!(f, "transport close failed: {transport}"),
            (None, None) => f.write_str("log forwarder shutdown failed"),
        }
    }
}

impl Error for ShutdownError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match (self.facade(), self.transport()) {
            (Some(facade), _) => Some(facade),
            (None, Some(transport)) => Some(transport),
            (None, None) => None,
        }
    }
}

/// Structured logger that forwards every record to a collector.
///
/// Build it inside a tokio runtime, log through [`logger`](Self::logger)
/// or install [`layer`](Self::layer) into a `tracing` subscriber, and call
/// [`close`](Self::close) on every exit path. `close` runs exactly once:
///
/// 1. the logger flushes everything it has queued into the sink;
/// 2. the sink closes the transport, bounded by the shutdown timeout.
///
/// The shutdown runs as its own task on the runtime the handle was created
/// on, so a caller that stops waiting does not interrupt or repeat it. A
/// handle dropped without `close` starts the same shutdown.
pub struct ForwardLogger {
    logger: Logger,
    sink: Arc<FluentSink>,
    shutdown_timeout: Duration,
    outcome: Mutex<Option<Outcome>>,
    runtime: Handle,
}

type Outcome = watch::Receiver<Option<Result<(), ShutdownError>>>;

impl ForwardLogger {
    /// Build the transport described by `config.transport`, then the sink,
    /// then the logger.
    ///
    /// Transport configuration errors are reported before anything is
    /// started, so no partially built handle or background task remains.
    pub fn new(config: LoggerConfig) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        let transport = make_transport(&config.transport)?;
        Ok(Self::build(&config, transport, runtime))
    }

    /// Like [`new`](Self::new) but with a caller supplied transport;
    /// `config.transport` is ignored.
    pub fn with_transport(
        config: LoggerConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        Ok(Self::build(&config, transport, runtime))
    }

    fn build(config: &LoggerConfig, transport: Arc<dyn Transport>, runtime: Handle) -> Self {
        let sink = Arc::new(FluentSink::new(transport, config.resolved_tag()));
        let logger = Logger::spawn(
            Arc::clone(&sink),
            config.min_level(),
            Encoder::new(config.duration_format),
            config.resolved_channel_capacity(),
            config.overflow,
            &runtime,
        );

        tracing::debug!(
            tag = sink.tag(),
            level = %logger.level(),
            "log forwarder started"
        );

        Self {
            logger,
            sink,
            shutdown_timeout: config.resolved_shutdown_timeout(),
            outcome: Mutex::new(None),
            runtime,
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// A `tracing` layer feeding this handle's logger.
    pub fn layer(&self) -> ForwardLayer {
        ForwardLayer::new(self.logger.clone())
    }

    pub fn tag(&self) -> &str {
        self.sink.tag()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// True once shutdown has started.
    pub fn is_closed(&self) -> bool {
        self.outcome.lock().is_some()
    }

    /// Flush the logger, then close the transport within the shutdown
    /// timeout.
    ///
    /// Concurrent and repeated calls share the outcome of the first one,
    /// including calls made after an earlier caller gave up waiting.
    /// A [`SinkError::FlushTimeout`] means the transport close is still
    /// running in the background.
    pub async fn close(&self) -> Result<(), ShutdownError> {
        let mut outcome = self.start_shutdown();
        let result = match outcome.wait_for(Option::is_some).await {
            Ok(result) => result.clone().unwrap_or(Ok(())),
            // The shutdown task was dropped with its runtime.
            Err(_) => Err(ShutdownError {
                facade: Some(Arc::new(FacadeError::WorkerStopped)),
                transport: None,
            }),
        };
        result
    }

    /// Spawn the shutdown task unless it already exists.
    fn start_shutdown(&self) -> Outcome {
        let mut slot = self.outcome.lock();
        if let Some(outcome) = slot.as_ref() {
            return outcome.clone();
        }

        let (tx, rx) = watch::channel(None);
        let logger = self.logger.clone();
        let sink = Arc::clone(&self.sink);
        let timeout = self.shutdown_timeout;
        self.runtime.spawn(async move {
            let result = drain(logger, sink, timeout).await;
            let _ = tx.send(Some(result));
        });

        *slot = Some(rx.clone());
        rx
    }
}

impl fmt::Debug for ForwardLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardLogger")
            .field("tag", &self.sink.tag())
            .field("level", &self.logger.level())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for ForwardLogger {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }

        let mut outcome = self.start_shutdown();
        self.runtime.spawn(async move {
            if let Ok(result) = outcome.wait_for(Option::is_some).await {
                if let Some(Err(e)) = result.as_ref() {
                    tracing::warn!(error = %e, "log forwarder dropped without close, shutdown failed");
                }
            }
        });
    }
}

/// Close a handle that may never have been constructed.
pub async fn shutdown(handle: Option<&ForwardLogger>) -> Result<(), ShutdownError> {
    match handle {
        Some(handle) => handle.close().await,
        None => Ok(()),
    }
}

async fn drain(
    logger: Logger,
    sink: Arc<FluentSink>,
    timeout: Duration,
) -> Result<(), ShutdownError> {
    let facade = logger.close().await.err();
    let transport = sink.flush_and_close(timeout).await.err();

    if let (Some(facade), Some(transport)) = (&facade, &transport) {
        tracing::warn!(
            tag = sink.tag(),
            error = %transport,
            facade_error = %facade,
            "transport close failed after logger flush failure"
        );
    }

    if facade.is_none() && transport.is_none() {
        return Ok(());
    }

    Err(ShutdownError {
        facade: facade.map(Arc::new),
        transport: transport.map(Arc::new),
    })
}
