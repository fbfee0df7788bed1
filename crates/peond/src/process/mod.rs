//! Daemon process lifecycle: detachment, PID bookkeeping and signalling.

use std::io::{self, Write};
use std::time::Duration;

pub(crate) mod daemonizer;
mod errors;
mod files;
mod guard;
mod launch;
mod manager;
mod outcome;
mod redirect;
pub(crate) mod shutdown;
mod signal;
mod workload;

pub use daemonizer::{
    DaemonizeError, Daemonizer, Detachment, ForkDaemonizer, ForkStage, InlineDaemonizer,
};
pub use errors::LifecycleError;
pub use launch::LaunchMode;
pub use manager::{LifecycleManager, ProcessControl};
pub use outcome::{
    LifecycleState, RestartOutcome, StartOutcome, StatusMode, StatusReport, StopOutcome,
};
pub use redirect::{RedirectError, StandardStream};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};
pub use workload::{IdleWorkload, Workload, WorkloadContext, WorkloadError};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const FOREGROUND_ENV_VAR: &str = "PEON_FOREGROUND";

// Buffered output would otherwise be written once per forked process, or lost
// once the descriptors are rebound.
fn flush_stdio() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}
