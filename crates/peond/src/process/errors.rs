//! Defines the unified error surface for lifecycle commands.

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use peon_config::ConfigurationError;

use super::daemonizer::DaemonizeError;
use super::redirect::RedirectError;
use super::shutdown::ShutdownError;
use super::workload::WorkloadError;

/// Errors surfaced by `start`, `stop`, `restart` and `status`.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The configuration could not be validated or its directories prepared.
    #[error("invalid configuration: {source}")]
    Configuration {
        /// Underlying validation error.
        #[source]
        source: ConfigurationError,
    },
    /// A live process is recorded in the PID file.
    #[error("daemon already running with pid {pid}")]
    AlreadyRunning {
        /// PID recorded in the existing PID file.
        pid: u32,
    },
    /// Another invocation holds the startup lock but has not recorded a live PID.
    #[error("daemon startup already in progress (lock: '{lock}')")]
    StartupInProgress {
        /// Lock file held by the concurrent start.
        lock: PathBuf,
    },
    /// The lock file could not be opened.
    #[error("failed to create lock file '{path}': {source}")]
    LockCreate {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Locking the lock file failed for a reason other than contention.
    #[error("failed to lock '{path}': {source}")]
    LockAcquire {
        /// Lock file path.
        path: PathBuf,
        /// Underlying OS error.
        source: Errno,
    },
    /// Detaching from the controlling terminal failed.
    #[error("failed to detach daemon: {source}")]
    Detachment {
        /// Underlying detachment error.
        #[source]
        source: DaemonizeError,
    },
    /// Rebinding the standard streams failed.
    #[error("failed to redirect standard streams: {source}")]
    Redirect {
        /// Underlying redirection error.
        #[source]
        source: RedirectError,
    },
    /// Writing the PID file failed.
    #[error("failed to write pid file '{path}': {source}")]
    PidWrite {
        /// PID file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing a PID file failed.
    #[error("failed to remove pid file '{path}': {source}")]
    Cleanup {
        /// Path that could not be removed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The recorded PID cannot be signalled safely.
    #[error("refusing to signal pid {pid}: {reason}")]
    InvalidPid {
        /// PID read from the PID file.
        pid: u32,
        /// Why the PID was rejected.
        reason: &'static str,
    },
    /// Probing an existing PID failed with an unexpected error.
    #[error("failed to check existing process {pid}: {source}")]
    CheckProcess {
        /// PID that failed to probe.
        pid: u32,
        /// Underlying OS error.
        source: Errno,
    },
    /// A termination signal could not be delivered.
    #[error("failed to send {signal} to pid {pid}: {source}")]
    SignalDelivery {
        /// Target PID.
        pid: u32,
        /// Name of the signal being delivered.
        signal: &'static str,
        /// Underlying OS error.
        source: Errno,
    },
    /// The process kept running past the configured stop timeout.
    #[error("daemon pid {pid} still running after {timeout_ms} ms")]
    StopTimeout {
        /// Target PID.
        pid: u32,
        /// Timeout that elapsed.
        timeout_ms: u128,
    },
    /// Installing the shutdown listener failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// Building the async runtime failed.
    #[error("failed to build async runtime: {source}")]
    Runtime {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The workload returned an error.
    #[error("workload failed: {source}")]
    Workload {
        /// Underlying workload error.
        #[source]
        source: WorkloadError,
    },
}

impl From<ConfigurationError> for LifecycleError {
    fn from(source: ConfigurationError) -> Self {
        Self::Configuration { source }
    }
}

impl From<DaemonizeError> for LifecycleError {
    fn from(source: DaemonizeError) -> Self {
        Self::Detachment { source }
    }
}

impl From<RedirectError> for LifecycleError {
    fn from(source: RedirectError) -> Self {
        Self::Redirect { source }
    }
}

impl From<ShutdownError> for LifecycleError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}

impl From<WorkloadError> for LifecycleError {
    fn from(source: WorkloadError) -> Self {
        Self::Workload { source }
    }
}
