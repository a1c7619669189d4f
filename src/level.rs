use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a log call, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    #[serde(alias = "WARN")]
    Warning,
    Error,
    Panic,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Panic,
    ];

    /// Name written into the `level` field of every record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        }
    }

    /// ANSI escape used to color the level in the human-readable format.
    pub(crate) fn ansi_prefix(&self) -> &'static str {
        match self {
            Level::Debug => "\x1b[4;3m",
            Level::Info => "\x1b[0;34m",
            Level::Warning => "\x1b[0;33m",
            Level::Error => "\x1b[0;31m",
            Level::Panic => "\x1b[41m",
        }
    }

    pub(crate) fn ansi_suffix(&self) -> &'static str {
        match self {
            Level::Panic => "\x1b[40m\x1b[m",
            _ => "\x1b[m",
        }
    }

    pub(crate) fn colored(&self) -> String {
        format!("{}{}{}", self.ansi_prefix(), self.as_str(), self.ansi_suffix())
    }

    pub(crate) fn from_tracing(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warning,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a level name is not recognised.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid log level: '{0}'")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" | "WARNING" => Ok(Level::Warning),
            "ERROR" => Ok(Level::Error),
            "PANIC" => Ok(Level::Panic),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}
