//! Shared configuration for the peonserver daemon and its controlling command.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults, an
//! optional configuration file, `PEON_*` environment variables and finally
//! command-line flags. The loaded [`Config`] is deliberately loose (most
//! fields are optional) so it can be merged from partial sources; the
//! lifecycle manager never consumes it directly. Instead
//! [`DaemonConfig::resolve`] validates the merged values and produces the
//! immutable, normalised form the manager is bound to.

mod daemon;
mod defaults;
mod logging;

use std::path::PathBuf;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use daemon::{
    ConfigurationError, DaemonConfig, LifecyclePaths, StopPolicy, StreamTarget, StreamTargets,
};
pub use defaults::{
    DEFAULT_LOG_FILE, DEFAULT_LOG_FILTER, DEFAULT_PID_NAME, DEFAULT_PORT, DEFAULT_STOP_INTERVAL_MS,
    DEFAULT_WORK_DIR, default_log_filter, default_log_format, default_pid_dir,
};
pub use logging::{LogFormat, LogFormatParseError, LogSink};

/// Raw configuration merged from defaults, file, environment and CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "PEON")]
pub struct Config {
    /// Log file receiving telemetry and, in silent mode, redirected output.
    pub log_file: Option<PathBuf>,
    /// Directory holding the PID and lock files.
    pub pid_dir: Option<PathBuf>,
    /// File name of the PID file inside `pid_dir`.
    pub pid_name: Option<String>,
    /// Source bound to the daemon's standard input in silent mode.
    pub stdin: Option<PathBuf>,
    /// Destination appended to by the daemon's standard output in silent mode.
    pub stdout: Option<PathBuf>,
    /// Destination appended to by the daemon's standard error in silent mode.
    pub stderr: Option<PathBuf>,
    /// Redirect the daemon's standard streams after detaching.
    #[ortho_config(default = false)]
    pub silent: bool,
    /// Raise the log filter to `debug` and tell the workload to run in debug mode.
    #[ortho_config(default = false)]
    pub debug: bool,
    /// Service port handed through to the workload.
    pub port: Option<u16>,
    /// Tracing filter expression for the log sink.
    pub log_filter: Option<String>,
    /// Output format for the log sink.
    pub log_format: Option<LogFormat>,
    /// Working directory adopted by the daemon after the first fork.
    pub work_dir: Option<PathBuf>,
    /// Pause between termination signals sent by `stop`, in milliseconds.
    pub stop_interval_ms: Option<u64>,
    /// Upper bound for the `stop` retry loop; unbounded when unset.
    pub stop_timeout_ms: Option<u64>,
    /// Send `SIGKILL` once `stop_timeout_ms` elapses instead of failing.
    #[ortho_config(default = false)]
    pub stop_escalate: bool,
    /// Make `status` probe the recorded PID instead of trusting the file.
    #[ortho_config(default = false)]
    pub probe_status: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_file: None,
            pid_dir: None,
            pid_name: None,
            stdin: None,
            stdout: None,
            stderr: None,
            silent: false,
            debug: false,
            port: None,
            log_filter: None,
            log_format: None,
            work_dir: None,
            stop_interval_ms: None,
            stop_timeout_ms: None,
            stop_escalate: false,
            probe_status: false,
        }
    }
}

impl Config {
    /// Log file path, falling back to [`DEFAULT_LOG_FILE`].
    pub fn log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
    }

    /// PID directory, falling back to [`default_pid_dir`].
    pub fn pid_dir(&self) -> PathBuf {
        self.pid_dir.clone().unwrap_or_else(default_pid_dir)
    }

    /// PID file name, falling back to [`DEFAULT_PID_NAME`].
    pub fn pid_name(&self) -> &str {
        self.pid_name.as_deref().unwrap_or(DEFAULT_PID_NAME)
    }

    /// Service port, falling back to [`DEFAULT_PORT`].
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Effective log filter. The `debug` flag wins over any configured filter.
    pub fn log_filter(&self) -> &str {
        if self.debug {
            return "debug";
        }
        self.log_filter.as_deref().unwrap_or(default_log_filter())
    }

    /// Effective log format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Working directory for the detached daemon.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR))
    }

    /// Pause between stop attempts.
    pub fn stop_interval_ms(&self) -> u64 {
        self.stop_interval_ms.unwrap_or(DEFAULT_STOP_INTERVAL_MS)
    }
}
