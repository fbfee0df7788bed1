use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported log sink output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    Json,
    /// Human-readable single line output.
    #[default]
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Destination and shape of the daemon's log output.
///
/// The sink is resolved once from configuration and handed to the telemetry
/// layer explicitly; nothing looks a logger up by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSink {
    path: PathBuf,
    format: LogFormat,
    filter: String,
}

impl LogSink {
    /// Builds a sink writing to `path`.
    pub fn new(path: PathBuf, format: LogFormat, filter: impl Into<String>) -> Self {
        Self {
            path,
            format,
            filter: filter.into(),
        }
    }

    /// File the sink appends to.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Output format.
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Tracing filter expression.
    pub fn filter(&self) -> &str {
        self.filter.as_str()
    }
}
