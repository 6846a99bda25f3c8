//! Environment variable names used to configure the forwarder from a
//! service's environment, and strict parsers for them.
//!
//! These are helpers only; [`TransportConfig`] and [`LoggerConfig`] never
//! read the environment themselves. Unset or empty variables keep their
//! defaults, but a set variable with an invalid value is an error.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::config::{LoggerConfig, Network, TransportConfig};

/// `tcp`, `tls` or `unix`. Default `tcp`.
pub const FLUENT_NETWORK_ENV: &str = "FLUENT_NETWORK";
/// Collector host. Default `127.0.0.1`.
pub const FLUENT_HOST_ENV: &str = "FLUENT_HOST";
/// Collector port. Default `24224`.
pub const FLUENT_PORT_ENV: &str = "FLUENT_PORT";
/// Socket path, required for the unix network.
pub const FLUENT_SOCKET_PATH_ENV: &str = "FLUENT_SOCKET_PATH";
/// Connect timeout, e.g. `10s`.
pub const FLUENT_TIMEOUT_ENV: &str = "FLUENT_TIMEOUT";
/// Write timeout, e.g. `2s`. `0s` disables it.
pub const FLUENT_WRITE_TIMEOUT_ENV: &str = "FLUENT_WRITE_TIMEOUT";
/// Async queue capacity. Default `8192`.
pub const FLUENT_BUFFER_LIMIT_ENV: &str = "FLUENT_BUFFER_LIMIT";
/// Retries after a failed send. Default `13`.
pub const FLUENT_MAX_RETRY_ENV: &str = "FLUENT_MAX_RETRY";
/// Initial wait between retries in milliseconds. Default `500`.
pub const FLUENT_RETRY_WAIT_ENV: &str = "FLUENT_RETRY_WAIT";
pub const FLUENT_ASYNC_ENV: &str = "FLUENT_ASYNC";
pub const FLUENT_FORCE_STOP_ASYNC_SEND_ENV: &str = "FLUENT_FORCE_STOP_ASYNC_SEND";
pub const FLUENT_SUB_SECOND_PRECISION_ENV: &str = "FLUENT_SUB_SECOND_PRECISION";
pub const FLUENT_MARSHAL_AS_JSON_ENV: &str = "FLUENT_MARSHAL_AS_JSON";
pub const FLUENT_REQUEST_ACK_ENV: &str = "FLUENT_REQUEST_ACK";
pub const FLUENT_TLS_INSECURE_SKIP_VERIFY_ENV: &str = "FLUENT_TLS_INSECURE_SKIP_VERIFY";
/// Pause after a failed async delivery, in milliseconds.
pub const FLUENT_ASYNC_RECONNECT_INTERVAL_ENV: &str = "FLUENT_ASYNC_RECONNECT_INTERVAL";
pub const FLUENT_TAG_PREFIX_ENV: &str = "FLUENT_TAG_PREFIX";
/// Routing tag of the logger. Default `app.logs`.
pub const FLUENT_LOG_TAG_ENV: &str = "FLUENT_LOG_TAG";
/// Minimum log level. Default `debug`.
pub const FLUENT_LOG_LEVEL_ENV: &str = "FLUENT_LOG_LEVEL";
/// Shutdown deadline, e.g. `5s`.
pub const FLUENT_SHUTDOWN_TIMEOUT_ENV: &str = "FLUENT_SHUTDOWN_TIMEOUT";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum EnvError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("FLUENT_SOCKET_PATH is required when FLUENT_NETWORK is unix")]
    MissingSocketPath,
}

/// Build a [`TransportConfig`] from the process environment.
pub fn transport_config_from_env() -> Result<TransportConfig, EnvError> {
    transport_config_from_lookup(|key| std::env::var(key).ok())
}

/// Build a [`LoggerConfig`], including its transport, from the process
/// environment.
pub fn logger_config_from_env() -> Result<LoggerConfig, EnvError> {
    logger_config_from_lookup(|key| std::env::var(key).ok())
}

/// Build a [`TransportConfig`] from an arbitrary variable source.
pub fn transport_config_from_lookup<F>(lookup: F) -> Result<TransportConfig, EnvError>
where
    F: Fn(&str) -> Option<String>,
{
    let vars = Vars(lookup);
    let mut cfg = TransportConfig::default();

    if let Some(network) = vars.get(FLUENT_NETWORK_ENV) {
        network
            .parse::<Network>()
            .map_err(|e| invalid(FLUENT_NETWORK_ENV, &network, e))?;
        cfg.network = network;
    }

    if cfg.network == Network::Unix.as_str() {
        let path = vars.get(FLUENT_SOCKET_PATH_ENV).ok_or(EnvError::MissingSocketPath)?;
        cfg.socket_path = Some(PathBuf::from(path));
    } else {
        if let Some(host) = vars.get(FLUENT_HOST_ENV) {
            cfg.host = host;
        }
        if let Some(port) = vars.parse::<u16>(FLUENT_PORT_ENV)? {
            cfg.port = port;
        }
    }

    if let Some(timeout) = vars.duration(FLUENT_TIMEOUT_ENV)? {
        cfg.timeout = timeout;
    }
    if let Some(write_timeout) = vars.duration(FLUENT_WRITE_TIMEOUT_ENV)? {
        cfg.write_timeout = (!write_timeout.is_zero()).then_some(write_timeout);
    }

    if let Some(limit) = vars.parse::<usize>(FLUENT_BUFFER_LIMIT_ENV)? {
        cfg.buffer_limit = limit;
    }
    if let Some(max_retry) = vars.parse::<u32>(FLUENT_MAX_RETRY_ENV)? {
        cfg.max_retry = max_retry;
    }
    if let Some(wait_ms) = vars.parse::<u64>(FLUENT_RETRY_WAIT_ENV)? {
        cfg.retry_wait = Duration::from_millis(wait_ms);
    }

    cfg.async_send = vars.flag(FLUENT_ASYNC_ENV)?;
    cfg.force_stop_async_send = vars.flag(FLUENT_FORCE_STOP_ASYNC_SEND_ENV)?;
    cfg.sub_second_precision = vars.flag(FLUENT_SUB_SECOND_PRECISION_ENV)?;
    cfg.marshal_as_json = vars.flag(FLUENT_MARSHAL_AS_JSON_ENV)?;
    cfg.request_ack = vars.flag(FLUENT_REQUEST_ACK_ENV)?;
    cfg.tls_insecure_skip_verify = vars.flag(FLUENT_TLS_INSECURE_SKIP_VERIFY_ENV)?;

    if let Some(interval_ms) = vars.parse::<u64>(FLUENT_ASYNC_RECONNECT_INTERVAL_ENV)? {
        cfg.async_reconnect_interval = Duration::from_millis(interval_ms);
    }

    cfg.tag_prefix = vars.get(FLUENT_TAG_PREFIX_ENV);

    Ok(cfg)
}

/// Build a [`LoggerConfig`] from an arbitrary variable source.
pub fn logger_config_from_lookup<F>(lookup: F) -> Result<LoggerConfig, EnvError>
where
    F: Fn(&str) -> Option<String>,
{
    let vars = Vars(&lookup);
    let mut cfg = LoggerConfig::default();

    if let Some(tag) = vars.get(FLUENT_LOG_TAG_ENV) {
        cfg.tag = tag;
    }
    if let Some(level) = vars.get(FLUENT_LOG_LEVEL_ENV) {
        cfg.level = level;
    }
    if let Some(timeout) = vars.duration(FLUENT_SHUTDOWN_TIMEOUT_ENV)? {
        cfg.shutdown_timeout = timeout;
    }

    cfg.transport = transport_config_from_lookup(&lookup)?;
    Ok(cfg)
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var).filter(|value| !value.is_empty())
    }

    fn parse<T>(&self, var: &'static str) -> Result<Option<T>, EnvError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(var)
            .map(|value| value.parse::<T>().map_err(|e| invalid(var, &value, e)))
            .transpose()
    }

    fn duration(&self, var: &'static str) -> Result<Option<Duration>, EnvError> {
        self.get(var)
            .map(|value| humantime::parse_duration(&value).map_err(|e| invalid(var, &value, e)))
            .transpose()
    }

    /// Only `true` and `false` (any case) are accepted; unset means false.
    fn flag(&self, var: &'static str) -> Result<bool, EnvError> {
        match self.get(var).map(|value| value.to_ascii_lowercase()).as_deref() {
            None => Ok(false),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(_) => Err(invalid(
                var,
                &self.get(var).unwrap_or_default(),
                "expected true or false",
            )),
        }
    }
}

fn invalid(var: &'static str, value: &str, reason: impl std::fmt::Display) -> EnvError {
    EnvError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = transport_config_from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.network, "tcp");
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 24224);
        assert_eq!(cfg.timeout, Duration::from_secs(10));
        assert_eq!(cfg.buffer_limit, 8192);
        assert!(!cfg.async_send);
        assert_eq!(cfg.tag_prefix, None);
    }

    #[test]
    fn reads_every_variable() {
        let cfg = transport_config_from_lookup(lookup(&[
            ("FLUENT_NETWORK", "tls"),
            ("FLUENT_HOST", "collector.internal"),
            ("FLUENT_PORT", "24225"),
            ("FLUENT_TIMEOUT", "3s"),
            ("FLUENT_WRITE_TIMEOUT", "750ms"),
            ("FLUENT_BUFFER_LIMIT", "100"),
            ("FLUENT_MAX_RETRY", "2"),
            ("FLUENT_RETRY_WAIT", "20"),
            ("FLUENT_ASYNC", "TRUE"),
            ("FLUENT_FORCE_STOP_ASYNC_SEND", "false"),
            ("FLUENT_SUB_SECOND_PRECISION", "true"),
            ("FLUENT_MARSHAL_AS_JSON", "true"),
            ("FLUENT_REQUEST_ACK", "true"),
            ("FLUENT_TLS_INSECURE_SKIP_VERIFY", "true"),
            ("FLUENT_ASYNC_RECONNECT_INTERVAL", "250"),
            ("FLUENT_TAG_PREFIX", "prod"),
        ]))
        .unwrap();

        assert_eq!(cfg.network, "tls");
        assert_eq!(cfg.host, "collector.internal");
        assert_eq!(cfg.port, 24225);
        assert_eq!(cfg.timeout, Duration::from_secs(3));
        assert_eq!(cfg.write_timeout, Some(Duration::from_millis(750)));
        assert_eq!(cfg.buffer_limit, 100);
        assert_eq!(cfg.max_retry, 2);
        assert_eq!(cfg.retry_wait, Duration::from_millis(20));
        assert!(cfg.async_send);
        assert!(!cfg.force_stop_async_send);
        assert!(cfg.sub_second_precision);
        assert!(cfg.marshal_as_json);
        assert!(cfg.request_ack);
        assert!(cfg.tls_insecure_skip_verify);
        assert_eq!(cfg.async_reconnect_interval, Duration::from_millis(250));
        assert_eq!(cfg.tag_prefix.as_deref(), Some("prod"));
    }

    #[test]
    fn unix_requires_socket_path() {
        let err = transport_config_from_lookup(lookup(&[("FLUENT_NETWORK", "unix")])).unwrap_err();
        assert_eq!(err, EnvError::MissingSocketPath);

        let cfg = transport_config_from_lookup(lookup(&[
            ("FLUENT_NETWORK", "unix"),
            ("FLUENT_SOCKET_PATH", "/var/run/fluent.sock"),
            ("FLUENT_PORT", "not-used"),
        ]))
        .unwrap();
        assert_eq!(cfg.socket_path, Some(PathBuf::from("/var/run/fluent.sock")));
    }

    #[test]
    fn rejects_invalid_values() {
        for (var, value) in [
            ("FLUENT_NETWORK", "carrier-pigeon"),
            ("FLUENT_PORT", "abc"),
            ("FLUENT_PORT", "70000"),
            ("FLUENT_TIMEOUT", "soon"),
            ("FLUENT_BUFFER_LIMIT", "-1"),
            ("FLUENT_ASYNC", "yes"),
            ("FLUENT_ASYNC_RECONNECT_INTERVAL", "1.5"),
        ] {
            let err = transport_config_from_lookup(lookup(&[(var, value)])).unwrap_err();
            assert!(
                matches!(&err, EnvError::Invalid { var: v, value: got, .. } if *v == var && got == value),
                "{var}={value} gave {err:?}"
            );
        }
    }

    #[test]
    fn zero_write_timeout_disables_it() {
        let cfg = transport_config_from_lookup(lookup(&[("FLUENT_WRITE_TIMEOUT", "0s")])).unwrap();
        assert_eq!(cfg.write_timeout, None);
    }

    #[test]
    fn logger_config_reads_tag_and_level() {
        let cfg = logger_config_from_lookup(lookup(&[
            ("FLUENT_LOG_TAG", "orders"),
            ("FLUENT_LOG_LEVEL", "WARNING"),
            ("FLUENT_SHUTDOWN_TIMEOUT", "2s"),
            ("FLUENT_PORT", "5170"),
        ]))
        .unwrap();

        assert_eq!(cfg.tag, "orders");
        assert_eq!(cfg.min_level(), crate::level::Level::Warn);
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(cfg.transport.port, 5170);
    }
}
