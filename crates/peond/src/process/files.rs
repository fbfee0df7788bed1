use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;
use tracing::{debug, warn};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use super::PROCESS_TARGET;
use super::errors::LifecycleError;

/// Permission bits applied to PID files.
pub(super) const PID_FILE_MODE: u32 = 0o644;

/// Writes the provided bytes to the path using an atomic persist step.
///
/// Data is flushed and fsync'd before the temporary file is renamed into
/// place so readers never observe a partially written record.
pub(super) fn atomic_write(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "target path did not have a parent directory",
        )
    })?;

    let mut builder = Builder::new();
    builder.prefix(
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("peond"),
    );
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        builder.permissions(Permissions::from_mode(mode));
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}

/// Reads the PID record at `path`.
///
/// Missing, unreadable and unparsable files all read as "no record".
pub(super) fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok()
}

/// Removes `path`, treating a missing file as success.
pub(super) fn remove_file(path: &Path) -> Result<(), LifecycleError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => {
            warn!(
                target: PROCESS_TARGET,
                file = %path.display(),
                error = %source,
                "failed to remove file"
            );
            Err(LifecycleError::Cleanup {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

/// Removes the PID file only while it still names `pid`.
///
/// A record rewritten by a newer instance is left alone. Returns whether a
/// file was removed.
pub(super) fn remove_pid_record(path: &Path, pid: u32) -> Result<bool, LifecycleError> {
    match read_pid(path) {
        Some(recorded) if recorded == pid => {
            remove_file(path)?;
            debug!(
                target: PROCESS_TARGET,
                pid,
                file = %path.display(),
                "pid file removed"
            );
            Ok(true)
        }
        Some(recorded) => {
            debug!(
                target: PROCESS_TARGET,
                pid,
                recorded,
                file = %path.display(),
                "pid file now names another process; leaving it in place"
            );
            Ok(false)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case::plain("4242\n", Some(4242))]
    #[case::whitespace("  17  \n\n", Some(17))]
    #[case::garbage("not-a-pid", None)]
    #[case::negative("-5\n", None)]
    #[case::empty("", None)]
    fn reads_pid_records(#[case] contents: &str, #[case] expected: Option<u32>) {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("peon.pid");
        fs::write(&path, contents).expect("write pid");
        assert_eq!(read_pid(&path), expected);
    }

    #[test]
    fn missing_record_reads_as_none() {
        let dir = TempDir::new().expect("temp dir");
        assert_eq!(read_pid(&dir.path().join("absent.pid")), None);
    }

    #[test]
    fn atomic_write_replaces_existing_contents() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("peon.pid");
        fs::write(&path, "999999\n").expect("seed pid");
        atomic_write(&path, b"12\n", PID_FILE_MODE).expect("atomic write");
        assert_eq!(fs::read_to_string(&path).expect("read pid"), "12\n");
        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, PID_FILE_MODE);
        }
    }

    #[test]
    fn pid_record_is_kept_when_rewritten_by_another_process() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("peon.pid");
        fs::write(&path, "77\n").expect("seed pid");
        assert!(!remove_pid_record(&path, 76).expect("comparison succeeds"));
        assert!(path.exists());
        assert!(remove_pid_record(&path, 77).expect("removal succeeds"));
        assert!(!path.exists());
    }
}
