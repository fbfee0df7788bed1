//! Validated, immutable daemon configuration.
//!
//! [`DaemonConfig`] is what the lifecycle manager is bound to. Every path it
//! carries is absolute and lexically normalised so that two invocations
//! started from different working directories agree on the PID file, which
//! is the only record of whether an instance is running.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use path_clean::PathClean;
use thiserror::Error;

use crate::Config;
use crate::logging::LogSink;

const DISCARD_KEYWORD: &str = "discard";
const NULL_DEVICE: &str = "/dev/null";

/// Errors raised while validating configuration or preparing its paths.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The current directory was needed to absolutise a relative path.
    #[error("failed to resolve the current directory: {source}")]
    CurrentDirectory {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The PID file name is unusable.
    #[error("invalid pid file name '{name}': {reason}")]
    InvalidPidName {
        /// Configured name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },
    /// The PID directory could not be created.
    #[error("failed to prepare pid directory '{path}': {source}")]
    PidDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The PID directory exists but is not a directory.
    #[error("pid directory '{path}' is not a directory")]
    NotADirectory {
        /// Offending path.
        path: PathBuf,
    },
}

/// Canonical locations of the files guarding a daemon instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecyclePaths {
    pid_dir: PathBuf,
    pid_path: PathBuf,
    lock_path: PathBuf,
}

impl LifecyclePaths {
    /// Builds the paths for `pid_name` inside `pid_dir`.
    ///
    /// `pid_dir` is absolutised against `base` and normalised; `pid_name` must
    /// be a plain file name.
    pub fn new(pid_dir: &Path, pid_name: &str, base: &Path) -> Result<Self, ConfigurationError> {
        validate_pid_name(pid_name)?;
        let pid_dir = normalise(pid_dir, base);
        Ok(Self {
            pid_path: pid_dir.join(pid_name),
            lock_path: pid_dir.join(format!("{pid_name}.lock")),
            pid_dir,
        })
    }

    /// Directory holding the PID and lock files.
    pub fn pid_dir(&self) -> &Path {
        self.pid_dir.as_path()
    }

    /// Path to the PID file.
    pub fn pid_path(&self) -> &Path {
        self.pid_path.as_path()
    }

    /// Path to the lock file serialising concurrent starts.
    pub fn lock_path(&self) -> &Path {
        self.lock_path.as_path()
    }

    /// Creates the PID directory if it does not exist yet.
    pub fn prepare(&self) -> Result<(), ConfigurationError> {
        fs::create_dir_all(&self.pid_dir).map_err(|source| ConfigurationError::PidDirectory {
            path: self.pid_dir.clone(),
            source,
        })?;
        if !self.pid_dir.is_dir() {
            return Err(ConfigurationError::NotADirectory {
                path: self.pid_dir.clone(),
            });
        }
        Ok(())
    }
}

fn validate_pid_name(name: &str) -> Result<(), ConfigurationError> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name == "." || name == ".." {
        Some("name refers to a directory")
    } else if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
        Some("name must not contain path separators")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ConfigurationError::InvalidPidName {
            name: name.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Absolutises `path` against `base` and folds `.` and `..` components.
///
/// The fold is purely lexical: the target need not exist, and symlinks are
/// left alone.
pub(crate) fn normalise(path: &Path, base: &Path) -> PathBuf {
    base.join(path).clean()
}

/// Where one of the daemon's standard streams is bound in silent mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTarget {
    /// The null device.
    Discard,
    /// A regular file; read from for stdin, appended to for output streams.
    File(PathBuf),
}

impl StreamTarget {
    fn resolve(configured: Option<&Path>, fallback: Self, base: &Path) -> Self {
        match configured {
            None => fallback,
            Some(path) if path == Path::new(DISCARD_KEYWORD) || path == Path::new(NULL_DEVICE) => {
                Self::Discard
            }
            Some(path) => Self::File(normalise(path, base)),
        }
    }

    /// Filesystem path to open for this target.
    pub fn path(&self) -> &Path {
        match self {
            Self::Discard => Path::new(NULL_DEVICE),
            Self::File(path) => path.as_path(),
        }
    }
}

/// Redirection targets for stdin, stdout and stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTargets {
    /// Source bound to standard input.
    pub stdin: StreamTarget,
    /// Destination for standard output.
    pub stdout: StreamTarget,
    /// Destination for standard error.
    pub stderr: StreamTarget,
}

/// How `stop` paces and bounds its termination signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    /// Pause between consecutive `SIGTERM` deliveries.
    pub interval: Duration,
    /// Upper bound on the loop; `None` retries until delivery fails.
    pub timeout: Option<Duration>,
    /// Send one `SIGKILL` when the timeout elapses instead of giving up.
    pub escalate: bool,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(crate::DEFAULT_STOP_INTERVAL_MS),
            timeout: None,
            escalate: false,
        }
    }
}

/// Immutable configuration the lifecycle manager is constructed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    paths: LifecyclePaths,
    log_sink: LogSink,
    streams: StreamTargets,
    work_dir: PathBuf,
    stop_policy: StopPolicy,
    silent: bool,
    debug: bool,
    probe_status: bool,
    port: u16,
}

impl DaemonConfig {
    /// Validates `config`, resolving relative paths against the current directory.
    pub fn resolve(config: &Config) -> Result<Self, ConfigurationError> {
        let base =
            env::current_dir().map_err(|source| ConfigurationError::CurrentDirectory { source })?;
        Self::resolve_from(config, &base)
    }

    /// Validates `config`, resolving relative paths against `base`.
    pub fn resolve_from(config: &Config, base: &Path) -> Result<Self, ConfigurationError> {
        let paths = LifecyclePaths::new(&config.pid_dir(), config.pid_name(), base)?;
        let log_file = normalise(&config.log_file(), base);
        let log_target = StreamTarget::File(log_file.clone());
        let streams = StreamTargets {
            stdin: StreamTarget::resolve(config.stdin.as_deref(), StreamTarget::Discard, base),
            stdout: StreamTarget::resolve(config.stdout.as_deref(), log_target.clone(), base),
            stderr: StreamTarget::resolve(config.stderr.as_deref(), log_target, base),
        };
        let stop_policy = StopPolicy {
            interval: Duration::from_millis(config.stop_interval_ms()),
            timeout: config.stop_timeout_ms.map(Duration::from_millis),
            escalate: config.stop_escalate,
        };
        Ok(Self {
            paths,
            log_sink: LogSink::new(log_file, config.log_format(), config.log_filter()),
            streams,
            work_dir: normalise(&config.work_dir(), base),
            stop_policy,
            silent: config.silent,
            debug: config.debug,
            probe_status: config.probe_status,
            port: config.port(),
        })
    }

    /// PID and lock file locations.
    pub fn paths(&self) -> &LifecyclePaths {
        &self.paths
    }

    /// Shortcut for the PID file path.
    pub fn pid_path(&self) -> &Path {
        self.paths.pid_path()
    }

    /// Log sink destination and format.
    pub fn log_sink(&self) -> &LogSink {
        &self.log_sink
    }

    /// Standard-stream redirection targets.
    pub fn streams(&self) -> &StreamTargets {
        &self.streams
    }

    /// Working directory adopted after detaching.
    pub fn work_dir(&self) -> &Path {
        self.work_dir.as_path()
    }

    /// Pacing and bounds for `stop`.
    pub fn stop_policy(&self) -> StopPolicy {
        self.stop_policy
    }

    /// Whether standard streams are redirected after detaching.
    pub fn silent(&self) -> bool {
        self.silent
    }

    /// Whether debug mode was requested.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Whether `status` should probe liveness.
    pub fn probe_status(&self) -> bool {
        self.probe_status
    }

    /// Service port handed to the workload.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Creates the PID directory; see [`LifecyclePaths::prepare`].
    pub fn prepare(&self) -> Result<(), ConfigurationError> {
        self.paths.prepare()
    }

    /// Returns a copy with a different PID file location.
    #[must_use]
    pub fn with_paths(mut self, paths: LifecyclePaths) -> Self {
        self.paths = paths;
        self
    }

    /// Returns a copy with a different stop policy.
    #[must_use]
    pub fn with_stop_policy(mut self, policy: StopPolicy) -> Self {
        self.stop_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case::relative("run", "/srv/app", "/srv/app/run")]
    #[case::dot_segments("./run/../pids/.", "/srv/app", "/srv/app/pids")]
    #[case::absolute("/var/run//peon", "/srv/app", "/var/run/peon")]
    #[case::above_root("/../../var", "/", "/var")]
    fn normalises_lexically(#[case] path: &str, #[case] base: &str, #[case] expected: &str) {
        assert_eq!(
            normalise(Path::new(path), Path::new(base)),
            PathBuf::from(expected)
        );
    }

    #[rstest]
    #[case::empty("")]
    #[case::dot(".")]
    #[case::dot_dot("..")]
    #[case::nested("run/peon.pid")]
    fn rejects_unusable_pid_names(#[case] name: &str) {
        let error = LifecyclePaths::new(Path::new("/run"), name, Path::new("/"))
            .expect_err("pid name should be rejected");
        assert!(matches!(error, ConfigurationError::InvalidPidName { .. }));
    }

    #[test]
    fn derives_pid_and_lock_paths() {
        let paths = LifecyclePaths::new(Path::new("pids"), "peon.pid", Path::new("/srv"))
            .expect("paths should resolve");
        assert_eq!(paths.pid_dir(), Path::new("/srv/pids"));
        assert_eq!(paths.pid_path(), Path::new("/srv/pids/peon.pid"));
        assert_eq!(paths.lock_path(), Path::new("/srv/pids/peon.pid.lock"));
    }

    #[test]
    fn output_streams_default_to_the_log_file() {
        let config = Config {
            log_file: Some(PathBuf::from("logs/peon.log")),
            ..Config::default()
        };
        let resolved =
            DaemonConfig::resolve_from(&config, Path::new("/srv")).expect("config resolves");
        let log = StreamTarget::File(PathBuf::from("/srv/logs/peon.log"));
        assert_eq!(resolved.streams().stdin, StreamTarget::Discard);
        assert_eq!(resolved.streams().stdout, log);
        assert_eq!(resolved.streams().stderr, log);
        assert_eq!(resolved.log_sink().path(), Path::new("/srv/logs/peon.log"));
    }

    #[rstest]
    #[case::keyword("discard")]
    #[case::null_device("/dev/null")]
    fn discard_targets_map_to_null_device(#[case] target: &str) {
        let config = Config {
            stdout: Some(PathBuf::from(target)),
            ..Config::default()
        };
        let resolved =
            DaemonConfig::resolve_from(&config, Path::new("/srv")).expect("config resolves");
        assert_eq!(resolved.streams().stdout, StreamTarget::Discard);
        assert_eq!(resolved.streams().stdout.path(), Path::new("/dev/null"));
    }

    #[test]
    fn stop_policy_reflects_configuration() {
        let config = Config {
            stop_interval_ms: Some(20),
            stop_timeout_ms: Some(500),
            stop_escalate: true,
            ..Config::default()
        };
        let resolved =
            DaemonConfig::resolve_from(&config, Path::new("/")).expect("config resolves");
        assert_eq!(
            resolved.stop_policy(),
            StopPolicy {
                interval: Duration::from_millis(20),
                timeout: Some(Duration::from_millis(500)),
                escalate: true,
            }
        );
    }

    #[test]
    fn prepare_creates_missing_directory() {
        let dir = TempDir::new().expect("temp dir");
        let paths = LifecyclePaths::new(&dir.path().join("a/b"), "peon.pid", Path::new("/"))
            .expect("paths resolve");
        paths.prepare().expect("directory should be created");
        assert!(paths.pid_dir().is_dir());
    }

    #[test]
    fn prepare_rejects_file_in_place_of_directory() {
        let dir = TempDir::new().expect("temp dir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").expect("write blocker");
        let paths =
            LifecyclePaths::new(&blocker, "peon.pid", Path::new("/")).expect("paths resolve");
        let error = paths.prepare().expect_err("file should not be usable as directory");
        assert!(matches!(
            error,
            ConfigurationError::PidDirectory { .. } | ConfigurationError::NotADirectory { .. }
        ));
    }
}
