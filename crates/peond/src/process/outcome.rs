//! Results reported by lifecycle commands.

use std::path::{Path, PathBuf};

use strum::Display;

/// Result of `start` on the side of the fork that observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The caller is the original process; the daemon continues elsewhere.
    Detached {
        /// PID of the intermediate child.
        child: u32,
    },
    /// The caller was the daemon and its workload has finished.
    Completed,
}

/// Result of a successful `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No readable PID record existed; nothing was touched.
    NotRunning,
    /// The recorded process accepted at least one `SIGTERM` and is gone.
    Stopped {
        /// PID that was stopped.
        pid: u32,
        /// Number of `SIGTERM` deliveries.
        attempts: u32,
    },
    /// The record named a process that no longer existed; the file was removed.
    StaleRecordRemoved {
        /// PID named by the stale record.
        pid: u32,
    },
}

/// Result of `restart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartOutcome {
    /// Outcome of the stop phase.
    pub stopped: StopOutcome,
    /// Outcome of the start phase.
    pub started: StartOutcome,
}

/// How `status` decides whether the daemon is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusMode {
    /// Trust the PID file: running iff it exists.
    #[default]
    Recorded,
    /// Probe the recorded PID and treat a dead one as stopped.
    Probed,
}

/// Derived lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleState {
    /// No instance is recorded, or the recorded one is dead.
    Stopped,
    /// An instance is recorded (and, when probed, alive).
    Running,
}

/// Snapshot returned by `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub(super) state: LifecycleState,
    pub(super) pid: Option<u32>,
    pub(super) stale: bool,
    pub(super) pid_path: PathBuf,
    pub(super) log_file: PathBuf,
    pub(super) port: u16,
}

impl StatusReport {
    /// Derived state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Whether the report says the daemon is running.
    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    /// PID read from the record, when it parsed.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether a probe found the record naming a dead process.
    pub fn stale(&self) -> bool {
        self.stale
    }

    /// PID file consulted.
    pub fn pid_path(&self) -> &Path {
        self.pid_path.as_path()
    }

    /// Log sink destination.
    pub fn log_file(&self) -> &Path {
        self.log_file.as_path()
    }

    /// Configured service port.
    pub fn port(&self) -> u16 {
        self.port
    }
}
