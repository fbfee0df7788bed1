use std::env;
use std::path::PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

use crate::logging::LogFormat;

/// Log file used when none is configured.
pub const DEFAULT_LOG_FILE: &str = "/tmp/peonserver.daemon.log";

/// PID file name used when none is configured.
pub const DEFAULT_PID_NAME: &str = "peonserver.pid";

/// Service port handed to the workload when none is configured.
pub const DEFAULT_PORT: u16 = 8085;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Working directory adopted by the daemon after detaching.
pub const DEFAULT_WORK_DIR: &str = "/";

/// Pause between termination signals sent by `stop`.
pub const DEFAULT_STOP_INTERVAL_MS: u64 = 100;

/// Default log filter expression.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default log sink format.
pub fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Computes the default PID directory.
///
/// Prefers `$XDG_RUNTIME_DIR/peonserver`; otherwise falls back to a
/// per-user namespace under the system temporary directory so two users on
/// one host never share a PID file.
pub fn default_pid_dir() -> PathBuf {
    #[cfg(unix)]
    {
        if let Some(mut dir) = runtime_dir() {
            dir.push("peonserver");
            return dir;
        }
        let mut dir = env::temp_dir();
        dir.push("peonserver");
        dir.push(format!("uid-{}", unsafe { geteuid() }));
        dir
    }

    #[cfg(not(unix))]
    {
        let mut dir = env::temp_dir();
        dir.push("peonserver");
        dir
    }
}
