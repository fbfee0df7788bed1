//! Lifecycle manager for the peonserver daemon.
//!
//! The [`process`] module turns an asynchronous [`process::Workload`] into a
//! detached daemon guarded by a PID file: a double fork detaches it from the
//! terminal, a `flock`ed lock file serialises concurrent starts, and `stop`
//! retries `SIGTERM` until the recorded process has gone. The [`cli`] module
//! is the `peond` controlling command built on top of it.
//!
//! ```text
//! peond [config flags] <start|stop|restart|status>
//! ```

pub mod cli;
pub mod process;
mod telemetry;

pub use cli::{CliError, LifecycleCommand, LifecycleOutput, run};
pub use process::{
    Daemonizer, ForkDaemonizer, IdleWorkload, InlineDaemonizer, LaunchMode, LifecycleError,
    LifecycleManager, ProcessControl, ShutdownSignal, StartOutcome, StatusMode, StatusReport,
    StopOutcome, SystemShutdownSignal, Workload, WorkloadContext, WorkloadError,
};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

#[cfg(test)]
mod tests;
