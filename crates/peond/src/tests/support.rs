//! Collaborators and process fixtures shared by the behavioural suite.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::sync::Notify;

use crate::process::{
    DaemonizeError, Daemonizer, Detachment, IdleWorkload, ShutdownError, ShutdownSignal,
    Workload, WorkloadContext, WorkloadError,
};

/// Daemoniser that records calls and reports a fixed detachment side.
#[derive(Debug, Clone)]
pub(crate) struct RecordingDaemonizer {
    calls: Arc<AtomicUsize>,
    detachment: Detachment,
}

impl RecordingDaemonizer {
    pub(crate) fn continuing() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            detachment: Detachment::DetachedChild,
        }
    }

    pub(crate) fn returning_to_caller(child: u32) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            detachment: Detachment::ParentExited { child },
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Daemonizer for RecordingDaemonizer {
    fn detach(&self, _work_dir: &Path) -> Result<Detachment, DaemonizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.detachment)
    }
}

/// Shutdown signal triggered explicitly by the test.
#[derive(Debug, Clone, Default)]
pub(crate) struct TestShutdownSignal {
    notify: Arc<Notify>,
}

impl TestShutdownSignal {
    pub(crate) fn trigger(&self) {
        self.notify.notify_one();
    }
}

impl ShutdownSignal for TestShutdownSignal {
    fn arm(&self) -> Result<(), ShutdownError> {
        Ok(())
    }

    async fn wait(&self) -> Result<(), ShutdownError> {
        self.notify.notified().await;
        Ok(())
    }
}

/// Workload variants exercised by the scenarios.
#[derive(Debug, Clone)]
pub(crate) enum TestWorkload {
    Idle(IdleWorkload),
    Failing(String),
}

impl Workload for TestWorkload {
    async fn run(&self, context: WorkloadContext) -> Result<(), WorkloadError> {
        match self {
            Self::Idle(workload) => workload.run(context).await,
            Self::Failing(message) => Err(WorkloadError::Failed {
                message: message.clone(),
            }),
        }
    }
}

/// A real child process reaped on a background thread.
///
/// Reaping matters: an unreaped zombie still answers `kill(pid, 0)`.
pub(crate) struct ChildProcess {
    pid: u32,
    exited: Arc<AtomicBool>,
    reaper: Option<JoinHandle<()>>,
}

impl ChildProcess {
    /// Spawns a long-lived `sleep`.
    pub(crate) fn spawn_live() -> Self {
        let mut command = Command::new("sleep");
        command.arg("30").stdout(Stdio::null());
        Self::watch(command.spawn().expect("spawn sleep"))
    }

    /// Spawns a long-lived shell that ignores `SIGTERM`.
    ///
    /// Returns once the trap is installed, so no signal can race it.
    pub(crate) fn spawn_ignoring_termination() -> Self {
        let mut command = Command::new("sh");
        command
            .args(["-c", "trap '' TERM; echo ready; exec sleep 30"])
            .stdout(Stdio::piped());
        let mut child = command.spawn().expect("spawn sh");
        let stdout = child.stdout.take().expect("piped stdout");
        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .expect("read readiness line");
        assert_eq!(line.trim(), "ready");
        Self::watch(child)
    }

    fn watch(mut child: Child) -> Self {
        let pid = child.id();
        let exited = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exited);
        let reaper = thread::spawn(move || {
            let _ = child.wait();
            flag.store(true, Ordering::SeqCst);
        });
        Self {
            pid,
            exited,
            reaper: Some(reaper),
        }
    }

    /// Returns the PID of a process that has already exited and been reaped.
    pub(crate) fn dead_pid() -> u32 {
        let mut child = Command::new("true").spawn().expect("spawn true");
        let pid = child.id();
        child.wait().expect("reap true");
        pid
    }

    pub(crate) fn pid(&self) -> u32 {
        self.pid
    }

    pub(crate) fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Waits for the reaper to observe the exit.
    pub(crate) fn join(&mut self) {
        if let Some(reaper) = self.reaper.take() {
            reaper.join().expect("reaper thread panicked");
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            let raw = i32::try_from(self.pid).expect("child pid fits in i32");
            let _ = kill(Pid::from_raw(raw), Signal::SIGKILL);
        }
        if let Some(reaper) = self.reaper.take() {
            let _ = reaper.join();
        }
    }
}
