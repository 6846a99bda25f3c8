use std::fmt;
use std::str::FromStr;

/// Level used when a configured level string is not recognised.
pub const DEFAULT_LEVEL: Level = Level::Debug;

const LEGACY_WARNING: &str = "WARNING";

/// Severity of a log record, ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Lowercase name written into the `severity` key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }

    /// Parse a configured level without failing.
    ///
    /// Unknown names fall back to [`DEFAULT_LEVEL`], except `"WARNING"`
    /// in any case, which older configurations use for [`Level::Warn`].
    /// An empty string selects [`Level::Info`].
    pub fn parse_or_default(s: &str) -> Self {
        if s.is_empty() {
            return Level::Info;
        }
        match s.parse() {
            Ok(level) => level,
            Err(_) if s.eq_ignore_ascii_case(LEGACY_WARNING) => Level::Warn,
            Err(_) => DEFAULT_LEVEL,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unrecognized level: {0:?}")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Accepts the canonical lowercase names and their uppercase forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" | "DEBUG" => Ok(Level::Debug),
            "info" | "INFO" => Ok(Level::Info),
            "warn" | "WARN" => Ok(Level::Warn),
            "error" | "ERROR" => Ok(Level::Error),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Level::Error,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::INFO => Level::Info,
            _ => Level::Debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_parse() {
        assert_eq!(Level::parse_or_default("error"), Level::Error);
        assert_eq!(Level::parse_or_default("INFO"), Level::Info);
        assert_eq!(Level::parse_or_default("warn"), Level::Warn);
        assert_eq!(Level::parse_or_default("DEBUG"), Level::Debug);
    }

    #[test]
    fn legacy_warning_maps_to_warn() {
        assert_eq!(Level::parse_or_default("WARNING"), Level::Warn);
        assert_eq!(Level::parse_or_default("warning"), Level::Warn);
        assert!("WARNING".parse::<Level>().is_err());
    }

    #[test]
    fn unknown_names_fall_back_to_debug() {
        assert_eq!(Level::parse_or_default("bogus"), Level::Debug);
        assert_eq!(Level::parse_or_default("Info"), Level::Debug);
        assert_eq!(Level::parse_or_default(""), Level::Info);
    }

    #[test]
    fn ordering_follows_severity() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Warn < Level::Error);
        assert_eq!(Level::from(tracing::Level::TRACE), Level::Debug);
        assert_eq!(Level::Warn.to_string(), "warn");
    }
}
