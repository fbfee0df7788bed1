//! The asynchronous task the daemon exists to run.

use std::future::Future;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

const WORKLOAD_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::workload");

/// Default pause between idle heartbeats.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// Values handed to the workload when the daemon starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadContext {
    port: u16,
    debug: bool,
    pid: u32,
}

impl WorkloadContext {
    /// Builds a context for the daemon with the given PID.
    pub fn new(port: u16, debug: bool, pid: u32) -> Self {
        Self { port, debug, pid }
    }

    /// Configured service port. Opaque to the lifecycle manager.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether debug mode was requested.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// PID of the daemon process.
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Errors a workload may report when it stops.
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// The workload hit an IO failure.
    #[error("workload io failure: {0}")]
    Io(#[from] io::Error),
    /// The workload gave up for its own reasons.
    #[error("{message}")]
    Failed {
        /// Human-readable description.
        message: String,
    },
}

/// Long-running task executed exactly once inside the detached daemon.
///
/// The future is dropped when a termination signal arrives, so
/// implementations should hold their resources in values whose `Drop`
/// releases them.
pub trait Workload: Send + Sync {
    /// Runs until the work is finished or the future is dropped.
    fn run(
        &self,
        context: WorkloadContext,
    ) -> impl Future<Output = Result<(), WorkloadError>> + Send;
}

/// Workload that only logs a heartbeat until it is cancelled.
#[derive(Debug, Clone, Copy)]
pub struct IdleWorkload {
    heartbeat: Duration,
}

impl IdleWorkload {
    /// Builds an idle workload beating at `heartbeat`.
    pub fn new(heartbeat: Duration) -> Self {
        Self { heartbeat }
    }
}

impl Default for IdleWorkload {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT)
    }
}

impl Workload for IdleWorkload {
    async fn run(&self, context: WorkloadContext) -> Result<(), WorkloadError> {
        info!(
            target: WORKLOAD_TARGET,
            pid = context.pid(),
            port = context.port(),
            debug = context.debug(),
            "idle workload started"
        );
        let mut ticker = time::interval(self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut beats: u64 = 0;
        loop {
            ticker.tick().await;
            beats = beats.wrapping_add(1);
            debug!(target: WORKLOAD_TARGET, beats, "heartbeat");
        }
    }
}
