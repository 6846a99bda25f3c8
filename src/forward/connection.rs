//! Blocking sockets to the collector.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::config::{ConfigError, Network, TransportConfig};
use crate::transport::TransportError;

/// Where to connect, resolved from a [`TransportConfig`].
pub(crate) enum Endpoint {
    Tcp {
        host: String,
        port: u16,
    },
    #[cfg(feature = "tls")]
    Tls {
        host: String,
        port: u16,
        connector: native_tls::TlsConnector,
    },
    Unix(PathBuf),
}

impl Endpoint {
    pub(crate) fn from_config(config: &TransportConfig) -> Result<Self, ConfigError> {
        match Network::from_str(&config.network)? {
            Network::Tcp => Ok(Endpoint::Tcp {
                host: config.host.clone(),
                port: config.port,
            }),
            Network::Unix => match &config.socket_path {
                Some(path) if !path.as_os_str().is_empty() => Ok(Endpoint::Unix(path.clone())),
                _ => Err(ConfigError::MissingSocketPath),
            },
            #[cfg(feature = "tls")]
            Network::Tls => {
                let mut builder = native_tls::TlsConnector::builder();
                if config.tls_insecure_skip_verify {
                    builder
                        .danger_accept_invalid_certs(true)
                        .danger_accept_invalid_hostnames(true);
                }
                let connector = builder
                    .build()
                    .map_err(|e| ConfigError::Tls(e.to_string()))?;
                Ok(Endpoint::Tls {
                    host: config.host.clone(),
                    port: config.port,
                    connector,
                })
            }
            #[cfg(not(feature = "tls"))]
            Network::Tls => Err(ConfigError::TlsDisabled),
        }
    }

    /// Open a new connection, trying every resolved address in turn.
    pub(crate) fn connect(&self, timeout: Duration) -> Result<Connection, TransportError> {
        let connect_err = |source| TransportError::Connect {
            target: self.to_string(),
            source,
        };

        match self {
            Endpoint::Tcp { host, port } => {
                let stream = connect_tcp(host, *port, timeout).map_err(connect_err)?;
                Ok(Connection::Tcp(stream))
            }
            #[cfg(feature = "tls")]
            Endpoint::Tls {
                host,
                port,
                connector,
            } => {
                let stream = connect_tcp(host, *port, timeout).map_err(connect_err)?;
                let tls = connector
                    .connect(host, stream)
                    .map_err(|e| connect_err(io::Error::other(e.to_string())))?;
                Ok(Connection::Tls(Box::new(tls)))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path).map_err(connect_err)?;
                Ok(Connection::Unix(stream))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(connect_err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not supported on this platform",
            ))),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            #[cfg(feature = "tls")]
            Endpoint::Tls { host, port, .. } => write!(f, "tls://{host}:{port}"),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{host}:{port} did not resolve to any address"),
        )
    }))
}

pub(crate) enum Connection {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<native_tls::TlsStream<TcpStream>>),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Connection {
    pub(crate) fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Connection::Tcp(s) => s.set_write_timeout(timeout),
            #[cfg(feature = "tls")]
            Connection::Tls(s) => s.get_ref().set_write_timeout(timeout),
            #[cfg(unix)]
            Connection::Unix(s) => s.set_write_timeout(timeout),
        }
    }

    pub(crate) fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Connection::Tcp(s) => s.set_read_timeout(timeout),
            #[cfg(feature = "tls")]
            Connection::Tls(s) => s.get_ref().set_read_timeout(timeout),
            #[cfg(unix)]
            Connection::Unix(s) => s.set_read_timeout(timeout),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(s) => s.write(buf),
            #[cfg(feature = "tls")]
            Connection::Tls(s) => s.write(buf),
            #[cfg(unix)]
            Connection::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Tcp(s) => s.flush(),
            #[cfg(feature = "tls")]
            Connection::Tls(s) => s.flush(),
            #[cfg(unix)]
            Connection::Unix(s) => s.flush(),
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(s) => s.read(buf),
            #[cfg(feature = "tls")]
            Connection::Tls(s) => s.read(buf),
            #[cfg(unix)]
            Connection::Unix(s) => s.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(network: &str) -> TransportConfig {
        TransportConfig {
            network: network.to_string(),
            ..TransportConfig::default()
        }
    }

    #[test]
    fn unknown_network_is_rejected() {
        let err = Endpoint::from_config(&config("carrier-pigeon")).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownNetwork(n) if n == "carrier-pigeon"));
    }

    #[test]
    fn unix_without_path_is_rejected() {
        let err = Endpoint::from_config(&config("unix")).err().unwrap();
        assert!(matches!(err, ConfigError::MissingSocketPath));

        let mut cfg = config("unix");
        cfg.socket_path = Some(PathBuf::new());
        let err = Endpoint::from_config(&cfg).err().unwrap();
        assert!(matches!(err, ConfigError::MissingSocketPath));
    }

    #[test]
    fn endpoint_display() {
        let tcp = Endpoint::from_config(&config("tcp")).unwrap();
        assert_eq!(tcp.to_string(), "tcp://127.0.0.1:24224");

        let mut cfg = config("unix");
        cfg.socket_path = Some(PathBuf::from("/tmp/fluent.sock"));
        let unix = Endpoint::from_config(&cfg).unwrap();
        assert_eq!(unix.to_string(), "unix:///tmp/fluent.sock");
    }

    #[test]
    fn connect_refused_is_reported_with_target() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut cfg = config("tcp");
        cfg.port = port;
        let endpoint = Endpoint::from_config(&cfg).unwrap();
        let err = endpoint.connect(Duration::from_millis(200)).err().unwrap();
        assert!(matches!(err, TransportError::Connect { ref target, .. } if target.ends_with(&port.to_string())));
    }
}
