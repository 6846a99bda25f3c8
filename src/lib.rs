pub mod config;
pub mod level;
pub mod record;
pub mod encoder;
pub mod transport;
pub mod sink;
pub mod logger;
pub mod layer;
pub mod handle;

pub mod forward;

pub mod env;
pub mod init;
pub mod noop_transport;

pub use config::{
    ConfigError, DurationFormat, LoggerConfig, Network, OverflowPolicy, TransportConfig,
};
pub use handle::{shutdown, ForwardLogger, ShutdownError};
pub use level::Level;
pub use logger::{FacadeError, Logger, LoggerStats};
pub use record::{FieldValue, Record};
pub use sink::{FluentSink, SinkError};
pub use transport::{make_transport, Transport, TransportError};
