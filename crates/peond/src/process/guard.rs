use std::fs::{File, OpenOptions};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::{info, warn};

use peon_config::LifecyclePaths;

use super::PROCESS_TARGET;
use super::errors::LifecycleError;
use super::files::{PID_FILE_MODE, atomic_write, read_pid, remove_pid_record};
use super::signal::check_process;

/// Holds the startup lock and owns the PID record of the running daemon.
///
/// Dropping the guard removes the PID file (while it still names this
/// process) and releases the lock. The lock file itself is left in place.
#[derive(Debug)]
pub(super) struct ProcessGuard {
    paths: LifecyclePaths,
    lock: Option<Flock<File>>,
    pid: Option<u32>,
}

impl ProcessGuard {
    /// Refuses to start over a live daemon, then takes the startup lock.
    ///
    /// The PID file is checked before the lock file is touched, so a
    /// refused start performs no filesystem writes. The check is repeated
    /// under the lock to close the window between two concurrent starts.
    pub(super) fn acquire(paths: LifecyclePaths) -> Result<Self, LifecycleError> {
        refuse_live_record(&paths)?;
        let lock = lock_startup(&paths)?;
        refuse_live_record(&paths)?;
        info!(
            target: PROCESS_TARGET,
            file = %paths.lock_path().display(),
            "acquired startup lock"
        );
        Ok(Self {
            paths,
            lock: Some(lock),
            pid: None,
        })
    }

    /// Records `pid` in the PID file, replacing any stale record.
    pub(super) fn write_pid(&mut self, pid: u32) -> Result<(), LifecycleError> {
        let path = self.paths.pid_path();
        atomic_write(path, format!("{pid}\n").as_bytes(), PID_FILE_MODE).map_err(|source| {
            warn!(
                target: PROCESS_TARGET,
                pid,
                file = %path.display(),
                error = %source,
                "failed to write pid file"
            );
            LifecycleError::PidWrite {
                path: path.to_path_buf(),
                source,
            }
        })?;
        self.pid = Some(pid);
        info!(
            target: PROCESS_TARGET,
            pid,
            file = %path.display(),
            "pid file written"
        );
        Ok(())
    }

    /// Forgets the guard without unlocking or removing anything.
    ///
    /// Used by the parent after a successful fork: the lock lives on an open
    /// file description shared with the child, and unlocking it here would
    /// release the child's lock too.
    pub(super) fn relinquish(mut self) {
        if let Some(lock) = self.lock.take() {
            std::mem::forget(lock);
        }
        self.pid = None;
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid
            && let Err(error) = remove_pid_record(self.paths.pid_path(), pid)
        {
            warn!(
                target: PROCESS_TARGET,
                pid,
                error = %error,
                "failed to clean up pid file"
            );
        }
        drop(self.lock.take());
    }
}

fn refuse_live_record(paths: &LifecyclePaths) -> Result<(), LifecycleError> {
    let Some(pid) = read_pid(paths.pid_path()) else {
        return Ok(());
    };
    if check_process(pid)? {
        info!(
            target: PROCESS_TARGET,
            pid,
            file = %paths.pid_path().display(),
            "refusing to start: existing daemon alive"
        );
        return Err(LifecycleError::AlreadyRunning { pid });
    }
    warn!(
        target: PROCESS_TARGET,
        pid,
        file = %paths.pid_path().display(),
        "pid file names a process that no longer exists; it will be replaced"
    );
    Ok(())
}

fn lock_startup(paths: &LifecyclePaths) -> Result<Flock<File>, LifecycleError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(PID_FILE_MODE);
    }
    let path = paths.lock_path();
    let file = options
        .open(path)
        .map_err(|source| LifecycleError::LockCreate {
            path: path.to_path_buf(),
            source,
        })?;
    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(lock) => Ok(lock),
        Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
            if let Some(pid) = read_pid(paths.pid_path())
                && check_process(pid)?
            {
                return Err(LifecycleError::AlreadyRunning { pid });
            }
            info!(
                target: PROCESS_TARGET,
                file = %path.display(),
                "startup lock held by another invocation"
            );
            Err(LifecycleError::StartupInProgress {
                lock: path.to_path_buf(),
            })
        }
        Err((_, source)) => Err(LifecycleError::LockAcquire {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> LifecyclePaths {
        LifecyclePaths::new(dir.path(), "peon.pid", Path::new("/")).expect("paths resolve")
    }

    #[test]
    fn guard_removes_its_own_pid_file() {
        let dir = TempDir::new().expect("temp dir");
        let paths = paths(&dir);
        let mut guard = ProcessGuard::acquire(paths.clone()).expect("acquire guard");
        guard.write_pid(std::process::id()).expect("write pid");
        assert_eq!(read_pid(paths.pid_path()), Some(std::process::id()));
        drop(guard);
        assert!(!paths.pid_path().exists());
        assert!(paths.lock_path().exists(), "lock file stays behind");
    }

    #[test]
    fn second_guard_sees_lock_contention() {
        let dir = TempDir::new().expect("temp dir");
        let paths = paths(&dir);
        let _first = ProcessGuard::acquire(paths.clone()).expect("acquire guard");
        let error = ProcessGuard::acquire(paths).expect_err("lock is held");
        assert!(matches!(error, LifecycleError::StartupInProgress { .. }));
    }

    #[test]
    fn live_record_is_refused_before_locking() {
        let dir = TempDir::new().expect("temp dir");
        let paths = paths(&dir);
        fs::write(paths.pid_path(), format!("{}\n", std::process::id())).expect("seed pid");
        let error = ProcessGuard::acquire(paths.clone()).expect_err("daemon is alive");
        assert!(matches!(error, LifecycleError::AlreadyRunning { pid } if pid == std::process::id()));
        assert!(!paths.lock_path().exists());
    }

    #[test]
    fn dropping_without_a_pid_leaves_foreign_record() {
        let dir = TempDir::new().expect("temp dir");
        let paths = paths(&dir);
        let guard = ProcessGuard::acquire(paths.clone()).expect("acquire guard");
        fs::write(paths.pid_path(), "999999\n").expect("foreign record");
        drop(guard);
        assert!(paths.pid_path().exists());
    }
}
