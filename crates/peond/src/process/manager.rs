//! The lifecycle state machine: `start`, `stop`, `restart` and `status`.
//!
//! State is never persisted beyond the PID file. Each command derives the
//! current state from disk, performs one transition and returns.

use tokio::runtime::Builder;
use tracing::{error, info, warn};

use peon_config::DaemonConfig;

use super::daemonizer::{Daemonizer, Detachment};
use super::errors::LifecycleError;
use super::files::{read_pid, remove_pid_record};
use super::guard::ProcessGuard;
use super::outcome::{
    LifecycleState, RestartOutcome, StartOutcome, StatusMode, StatusReport, StopOutcome,
};
use super::redirect::redirect_streams;
use super::shutdown::ShutdownSignal;
use super::signal::{check_process, terminate, validate_pid};
use super::workload::{Workload, WorkloadContext};
use super::{PROCESS_TARGET, SHUTDOWN_TIMEOUT};

/// Process-level collaborators needed to control the daemon lifecycle.
#[derive(Debug)]
pub struct ProcessControl<D, S> {
    /// Detachment strategy.
    pub daemonizer: D,
    /// Source of shutdown notifications inside the daemon.
    pub shutdown: S,
}

/// Drives one daemon instance identified by its PID file.
#[derive(Debug)]
pub struct LifecycleManager<W, D, S> {
    config: DaemonConfig,
    workload: W,
    process: ProcessControl<D, S>,
}

impl<W, D, S> LifecycleManager<W, D, S>
where
    W: Workload,
    D: Daemonizer,
    S: ShutdownSignal,
{
    /// Binds a manager to its configuration, workload and process collaborators.
    pub fn new(config: DaemonConfig, workload: W, process: ProcessControl<D, S>) -> Self {
        Self {
            config,
            workload,
            process,
        }
    }

    /// Configuration the manager was built with.
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Starts the daemon unless a live instance is recorded.
    ///
    /// Returns [`StartOutcome::Detached`] in the original caller, which should
    /// exit straight away, and [`StartOutcome::Completed`] in the daemon once
    /// its workload has ended.
    pub fn start(&self) -> Result<StartOutcome, LifecycleError> {
        self.start_inner().inspect_err(|failure| {
            error!(
                target: PROCESS_TARGET,
                file = %self.config.pid_path().display(),
                error = %failure,
                "start failed"
            );
        })
    }

    fn start_inner(&self) -> Result<StartOutcome, LifecycleError> {
        self.config.prepare()?;
        info!(
            target: PROCESS_TARGET,
            file = %self.config.pid_path().display(),
            silent = self.config.silent(),
            "starting daemon"
        );
        let guard = ProcessGuard::acquire(self.config.paths().clone())?;
        match self.process.daemonizer.detach(self.config.work_dir())? {
            Detachment::ParentExited { child } => {
                guard.relinquish();
                info!(
                    target: PROCESS_TARGET,
                    child,
                    "daemon detached; original process returning"
                );
                Ok(StartOutcome::Detached { child })
            }
            Detachment::DetachedChild => self.run_detached(guard),
        }
    }

    fn run_detached(&self, mut guard: ProcessGuard) -> Result<StartOutcome, LifecycleError> {
        if self.config.silent() {
            redirect_streams(self.config.streams())?;
        }
        self.process.shutdown.arm()?;
        let pid = std::process::id();
        guard.write_pid(pid)?;

        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("peond-runtime")
            .build()
            .map_err(|source| LifecycleError::Runtime { source })?;
        let context = WorkloadContext::new(self.config.port(), self.config.debug(), pid);
        let outcome = runtime.block_on(async {
            tokio::select! {
                result = self.workload.run(context) => {
                    info!(target: PROCESS_TARGET, pid, "workload finished");
                    result.map_err(LifecycleError::from)
                }
                result = self.process.shutdown.wait() => result.map_err(LifecycleError::from),
            }
        });
        runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
        drop(guard);
        info!(
            target: PROCESS_TARGET,
            pid,
            "shutdown sequence completed"
        );
        outcome.map(|()| StartOutcome::Completed)
    }

    /// Stops the recorded daemon, retrying `SIGTERM` until it has gone.
    ///
    /// A missing or unparsable record is not an error. A record naming a
    /// dead process, or a pid that `kill(2)` would widen to a process group,
    /// is removed without signalling anything.
    pub fn stop(&self) -> Result<StopOutcome, LifecycleError> {
        let pid_path = self.config.pid_path();
        let Some(pid) = read_pid(pid_path) else {
            info!(
                target: PROCESS_TARGET,
                file = %pid_path.display(),
                "stop requested but no daemon is recorded"
            );
            return Ok(StopOutcome::NotRunning);
        };
        if validate_pid(pid).is_err() {
            warn!(
                target: PROCESS_TARGET,
                pid,
                file = %pid_path.display(),
                "pid file names a pid that cannot be signalled"
            );
            return self.discard_stale_record(pid);
        }
        let attempts = terminate(pid, self.config.stop_policy()).inspect_err(|failure| {
            error!(
                target: PROCESS_TARGET,
                pid,
                error = %failure,
                "stop failed"
            );
        })?;
        if attempts == 0 {
            return self.discard_stale_record(pid);
        }
        remove_pid_record(pid_path, pid)?;
        info!(
            target: PROCESS_TARGET,
            pid,
            attempts,
            "daemon stopped"
        );
        Ok(StopOutcome::Stopped { pid, attempts })
    }

    fn discard_stale_record(&self, pid: u32) -> Result<StopOutcome, LifecycleError> {
        let pid_path = self.config.pid_path();
        if !remove_pid_record(pid_path, pid)? {
            info!(
                target: PROCESS_TARGET,
                pid,
                file = %pid_path.display(),
                "stale pid file already gone"
            );
            return Ok(StopOutcome::NotRunning);
        }
        warn!(
            target: PROCESS_TARGET,
            pid,
            file = %pid_path.display(),
            "removed stale pid file"
        );
        Ok(StopOutcome::StaleRecordRemoved { pid })
    }

    /// Stops any recorded daemon, then starts a fresh one.
    ///
    /// The two phases are not atomic: another invocation may start an
    /// instance in between, in which case the start phase fails with
    /// [`LifecycleError::AlreadyRunning`].
    pub fn restart(&self) -> Result<RestartOutcome, LifecycleError> {
        let stopped = self.stop()?;
        let started = self.start()?;
        Ok(RestartOutcome { stopped, started })
    }

    /// Reports whether the daemon is running. Never touches the filesystem.
    pub fn status(&self, mode: StatusMode) -> Result<StatusReport, LifecycleError> {
        let pid_path = self.config.pid_path();
        let recorded = pid_path.exists();
        let pid = read_pid(pid_path);
        let (state, stale) = match (mode, pid) {
            (StatusMode::Recorded, _) if recorded => (LifecycleState::Running, false),
            (StatusMode::Recorded, _) => (LifecycleState::Stopped, false),
            (StatusMode::Probed, Some(pid)) if check_process(pid)? => {
                (LifecycleState::Running, false)
            }
            (StatusMode::Probed, _) => (LifecycleState::Stopped, recorded),
        };
        Ok(StatusReport {
            state,
            pid,
            stale,
            pid_path: pid_path.to_path_buf(),
            log_file: self.config.log_sink().path().to_path_buf(),
            port: self.config.port(),
        })
    }
}
