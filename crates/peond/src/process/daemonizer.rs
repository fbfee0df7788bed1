//! Implements the detachment strategies for the `peond` process.

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::stat::{Mode, umask};
use nix::unistd::{ForkResult, chdir, fork, setsid};
use strum::Display;
use thiserror::Error;
use tracing::{debug, info};

use super::{PROCESS_TARGET, flush_stdio};

/// Which side of a detachment the caller ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detachment {
    /// The original caller. It must return promptly without touching the
    /// daemon's files; `child` is the first forked process.
    ParentExited {
        /// PID of the intermediate child.
        child: u32,
    },
    /// The process that carries on as the daemon.
    DetachedChild,
}

/// Abstraction over detachment strategies.
pub trait Daemonizer: Send + Sync {
    /// Detaches the process and reports which side the caller is on.
    fn detach(&self, work_dir: &Path) -> Result<Detachment, DaemonizeError>;
}

/// Fork stage at which detachment failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ForkStage {
    /// Fork performed by the original caller.
    First,
    /// Fork performed by the session leader.
    Second,
}

/// Errors surfaced by the detachment backend.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// `fork(2)` failed.
    #[error("{stage} fork failed: {source}")]
    Fork {
        /// Which fork failed.
        stage: ForkStage,
        /// Underlying OS error.
        source: Errno,
    },
    /// `setsid(2)` failed.
    #[error("failed to create a new session: {source}")]
    Session {
        /// Underlying OS error.
        source: Errno,
    },
    /// Changing into the working directory failed.
    #[error("failed to change directory to '{path}': {source}")]
    WorkingDirectory {
        /// Target directory.
        path: PathBuf,
        /// Underlying OS error.
        source: Errno,
    },
}

/// Double-fork daemoniser built on `nix`.
///
/// The first fork returns control to the caller; the child becomes a session
/// leader, moves to the working directory and clears its umask; the second
/// fork drops session leadership so the daemon can never reacquire a
/// controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkDaemonizer;

impl ForkDaemonizer {
    /// Builds a new fork-based daemoniser.
    pub fn new() -> Self {
        Self
    }
}

impl Daemonizer for ForkDaemonizer {
    fn detach(&self, work_dir: &Path) -> Result<Detachment, DaemonizeError> {
        info!(
            target: PROCESS_TARGET,
            work_dir = %work_dir.display(),
            "daemonising into background"
        );
        flush_stdio();
        // SAFETY: the process is single-threaded at this point: the async
        // runtime is only built after detachment.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                return Ok(Detachment::ParentExited {
                    child: child.as_raw().unsigned_abs(),
                });
            }
            Ok(ForkResult::Child) => {}
            Err(source) => {
                return Err(DaemonizeError::Fork {
                    stage: ForkStage::First,
                    source,
                });
            }
        }

        setsid().map_err(|source| DaemonizeError::Session { source })?;
        chdir(work_dir).map_err(|source| DaemonizeError::WorkingDirectory {
            path: work_dir.to_path_buf(),
            source,
        })?;
        umask(Mode::empty());

        // SAFETY: still single-threaded; the intermediate process only calls
        // `_exit`.
        match unsafe { fork() } {
            // SAFETY: `_exit` ends the session leader without running
            // destructors or atexit handlers, which belong to the daemon.
            Ok(ForkResult::Parent { .. }) => unsafe { libc::_exit(0) },
            Ok(ForkResult::Child) => {
                debug!(
                    target: PROCESS_TARGET,
                    pid = std::process::id(),
                    "daemon process detached; continuing in grandchild"
                );
                Ok(Detachment::DetachedChild)
            }
            Err(source) => Err(DaemonizeError::Fork {
                stage: ForkStage::Second,
                source,
            }),
        }
    }
}

/// Daemoniser that stays attached to the terminal.
///
/// Used in foreground mode; the caller always continues as the daemon.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDaemonizer;

impl Daemonizer for InlineDaemonizer {
    fn detach(&self, _work_dir: &Path) -> Result<Detachment, DaemonizeError> {
        info!(
            target: PROCESS_TARGET,
            "running in foreground; skipping detachment"
        );
        Ok(Detachment::DetachedChild)
    }
}
