//! Rebinds the daemon's standard streams once it has detached.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::unistd::dup2;
use strum::Display;
use thiserror::Error;
use tracing::debug;

use peon_config::StreamTargets;

use super::{PROCESS_TARGET, flush_stdio};

/// One of the three standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StandardStream {
    /// Standard input.
    Stdin,
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Errors raised while redirecting standard streams.
#[derive(Debug, Error)]
pub enum RedirectError {
    /// The redirection target could not be opened.
    #[error("failed to open '{path}' for {stream}: {source}")]
    Open {
        /// Stream being redirected.
        stream: StandardStream,
        /// Target path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// `dup2(2)` failed.
    #[error("failed to rebind {stream}: {source}")]
    Duplicate {
        /// Stream being redirected.
        stream: StandardStream,
        /// Underlying OS error.
        source: Errno,
    },
}

/// Points stdin at its source and appends stdout/stderr to their targets.
pub(super) fn redirect_streams(targets: &StreamTargets) -> Result<(), RedirectError> {
    flush_stdio();

    let stdin = open_source(StandardStream::Stdin, targets.stdin.path())?;
    rebind(StandardStream::Stdin, &stdin, io::stdin().as_raw_fd())?;
    let stdout = open_sink(StandardStream::Stdout, targets.stdout.path())?;
    rebind(StandardStream::Stdout, &stdout, io::stdout().as_raw_fd())?;
    let stderr = open_sink(StandardStream::Stderr, targets.stderr.path())?;
    rebind(StandardStream::Stderr, &stderr, io::stderr().as_raw_fd())?;
    debug!(
        target: PROCESS_TARGET,
        stdin = %targets.stdin.path().display(),
        stdout = %targets.stdout.path().display(),
        stderr = %targets.stderr.path().display(),
        "standard streams redirected"
    );
    Ok(())
}

fn open_source(stream: StandardStream, path: &Path) -> Result<File, RedirectError> {
    File::open(path).map_err(|source| RedirectError::Open {
        stream,
        path: path.to_path_buf(),
        source,
    })
}

fn open_sink(stream: StandardStream, path: &Path) -> Result<File, RedirectError> {
    let mut options = OpenOptions::new();
    options.append(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path).map_err(|source| RedirectError::Open {
        stream,
        path: path.to_path_buf(),
        source,
    })
}

fn rebind(stream: StandardStream, file: &File, target: RawFd) -> Result<(), RedirectError> {
    dup2(file.as_raw_fd(), target)
        .map(|_| ())
        .map_err(|source| RedirectError::Duplicate { stream, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn missing_source_reports_the_stream() {
        let dir = TempDir::new().expect("temp dir");
        let error = open_source(StandardStream::Stdin, &dir.path().join("absent"))
            .expect_err("source does not exist");
        assert!(error.to_string().contains("for stdin"));
    }

    #[test]
    fn sinks_append_rather_than_truncate() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("daemon.log");
        std::fs::write(&path, "first\n").expect("seed log");
        let mut sink = open_sink(StandardStream::Stdout, &path).expect("open sink");
        sink.write_all(b"second\n").expect("append");
        let contents = std::fs::read_to_string(&path).expect("read log");
        assert_eq!(contents, "first\nsecond\n");
    }
}
