//! The `peond` controlling command.
//!
//! Loads layered configuration, resolves it into a [`DaemonConfig`] and runs
//! exactly one lifecycle command against the [`LifecycleManager`]. User-facing
//! lines go through [`LifecycleOutput`]; diagnostics also reach the log sink.

mod arguments;
mod command;
mod output;

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;
use tracing::{error, info};

use peon_config::{Config, ConfigurationError, DaemonConfig};

use crate::process::{
    Daemonizer, ForkDaemonizer, IdleWorkload, InlineDaemonizer, LaunchMode, LifecycleError,
    LifecycleManager, ProcessControl, StartOutcome, StatusMode, StatusReport, StopOutcome,
    SystemShutdownSignal,
};
use crate::telemetry::{self, TelemetryError};

use arguments::{command_arguments, split_config_arguments};
use command::Cli;
pub use command::LifecycleCommand;
pub use output::LifecycleOutput;

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cli");

type Manager<D> = LifecycleManager<IdleWorkload, D, SystemShutdownSignal>;

/// Errors that end a `peond` invocation with a failure status.
#[derive(Debug, Error)]
pub enum CliError {
    /// The command tokens did not parse, or help was requested.
    #[error("{0}")]
    Usage(clap::Error),
    /// The layered configuration could not be loaded.
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(#[source] Arc<OrthoError>),
    /// The loaded configuration failed validation.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The log sink could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The lifecycle command itself failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// Writing a report line failed.
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs `peond` with the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let mut output = LifecycleOutput::new(stdout, stderr);
    match execute(&args, &mut output) {
        Ok(exit_code) => exit_code,
        Err(CliError::Usage(usage)) => report_usage(&usage, &mut output),
        Err(failure) => {
            error!(target: CLI_TARGET, error = %failure, "command failed");
            let _ = output.stderr_line(format_args!("peond: {failure}"));
            ExitCode::FAILURE
        }
    }
}

fn execute<W: Write, E: Write>(
    args: &[OsString],
    output: &mut LifecycleOutput<W, E>,
) -> Result<ExitCode, CliError> {
    let split = split_config_arguments(args);
    let cli = Cli::try_parse_from(command_arguments(args, &split)).map_err(CliError::Usage)?;
    let config = Config::load_from_iter(split.config_arguments.iter().cloned())
        .map_err(CliError::LoadConfiguration)?;
    let daemon = DaemonConfig::resolve(&config)?;
    telemetry::initialise(daemon.log_sink())?;
    info!(target: CLI_TARGET, command = %cli.command, "running lifecycle command");

    match LaunchMode::detect() {
        LaunchMode::Background => {
            dispatch(cli.command, &manager(daemon, ForkDaemonizer::new()), output)
        }
        LaunchMode::Foreground => {
            dispatch(cli.command, &manager(daemon, InlineDaemonizer), output)
        }
    }
}

// Help goes to stdout and succeeds; every other parse failure is an error.
fn report_usage<W: Write, E: Write>(
    usage: &clap::Error,
    output: &mut LifecycleOutput<W, E>,
) -> ExitCode {
    let rendered = usage.render().to_string();
    let text = rendered.trim_end();
    if usage.use_stderr() {
        let _ = output.stderr_line(format_args!("{text}"));
        ExitCode::FAILURE
    } else {
        let _ = output.stdout_line(format_args!("{text}"));
        ExitCode::SUCCESS
    }
}

fn manager<D: Daemonizer>(config: DaemonConfig, daemonizer: D) -> Manager<D> {
    LifecycleManager::new(
        config,
        IdleWorkload::default(),
        ProcessControl {
            daemonizer,
            shutdown: SystemShutdownSignal::new(),
        },
    )
}

fn dispatch<D: Daemonizer, W: Write, E: Write>(
    command: LifecycleCommand,
    manager: &Manager<D>,
    output: &mut LifecycleOutput<W, E>,
) -> Result<ExitCode, CliError> {
    match command {
        LifecycleCommand::Start => {
            let started = manager.start()?;
            report_start(manager, started, output)?;
        }
        LifecycleCommand::Stop => {
            let stopped = manager.stop()?;
            report_stop(manager, stopped, output)?;
        }
        LifecycleCommand::Restart => {
            let restarted = manager.restart()?;
            if let StartOutcome::Detached { .. } = restarted.started {
                report_stop(manager, restarted.stopped, output)?;
                report_start(manager, restarted.started, output)?;
            }
        }
        LifecycleCommand::Status => {
            let mode = if manager.config().probe_status() {
                StatusMode::Probed
            } else {
                StatusMode::Recorded
            };
            let report = manager.status(mode)?;
            report_status(&report, output)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn report_start<D: Daemonizer, W: Write, E: Write>(
    manager: &Manager<D>,
    outcome: StartOutcome,
    output: &mut LifecycleOutput<W, E>,
) -> Result<(), CliError> {
    // The daemon itself has nothing to say once its workload ends.
    if let StartOutcome::Detached { .. } = outcome {
        output.stdout_line(format_args!(
            "daemon started in background (pid file {}, log {})",
            manager.config().pid_path().display(),
            manager.config().log_sink().path().display()
        ))?;
    }
    Ok(())
}

fn report_stop<D: Daemonizer, W: Write, E: Write>(
    manager: &Manager<D>,
    outcome: StopOutcome,
    output: &mut LifecycleOutput<W, E>,
) -> Result<(), CliError> {
    match outcome {
        StopOutcome::NotRunning => output.stdout_line(format_args!(
            "daemon is not running (pid file missing at {})",
            manager.config().pid_path().display()
        ))?,
        StopOutcome::Stopped { pid, attempts } => output.stdout_line(format_args!(
            "daemon pid {pid} stopped after {attempts} termination signal(s)"
        ))?,
        StopOutcome::StaleRecordRemoved { pid } => output.stdout_line(format_args!(
            "daemon is not running; removed stale pid file for pid {pid}"
        ))?,
    }
    Ok(())
}

fn report_status<W: Write, E: Write>(
    report: &StatusReport,
    output: &mut LifecycleOutput<W, E>,
) -> Result<(), CliError> {
    let pid = report
        .pid()
        .map_or_else(|| String::from("unknown"), |pid| pid.to_string());
    if report.is_running() {
        output.stdout_line(format_args!(
            "daemon is running (pid {pid}, pid file {}, log {}, port {})",
            report.pid_path().display(),
            report.log_file().display(),
            report.port()
        ))?;
    } else if report.stale() {
        output.stdout_line(format_args!(
            "daemon is not running (stale pid file {} names pid {pid})",
            report.pid_path().display()
        ))?;
    } else {
        output.stdout_line(format_args!(
            "daemon is not running (pid file missing at {})",
            report.pid_path().display()
        ))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(values: &[&str]) -> Vec<OsString> {
        values.iter().map(OsString::from).collect()
    }

    fn run_captured(args: &[&str]) -> (ExitCode, String, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let exit = run(os(args), &mut stdout, &mut stderr);
        (
            exit,
            String::from_utf8(stdout).expect("utf8 stdout"),
            String::from_utf8(stderr).expect("utf8 stderr"),
        )
    }

    #[test]
    fn missing_command_prints_usage() {
        let (exit, stdout, stderr) = run_captured(&["peond", "--silent"]);
        assert_eq!(exit, ExitCode::FAILURE);
        assert!(stdout.is_empty());
        assert!(stderr.contains("Usage: peond"), "stderr: {stderr}");
    }

    #[test]
    fn unknown_command_is_rejected() {
        let (exit, _, stderr) = run_captured(&["peond", "reload"]);
        assert_eq!(exit, ExitCode::FAILURE);
        assert!(stderr.contains("unrecognized subcommand 'reload'"), "stderr: {stderr}");
    }

    #[test]
    fn trailing_arguments_are_rejected() {
        let (exit, _, stderr) = run_captured(&["peond", "stop", "now"]);
        assert_eq!(exit, ExitCode::FAILURE);
        assert!(stderr.contains("unexpected argument 'now'"), "stderr: {stderr}");
    }

    #[test]
    fn help_prints_usage_to_stdout() {
        let (exit, stdout, stderr) = run_captured(&["peond", "--silent", "--help"]);
        assert_eq!(exit, ExitCode::SUCCESS);
        assert!(stderr.is_empty());
        assert!(stdout.contains("Usage: peond [CONFIG FLAGS] <COMMAND>"), "stdout: {stdout}");
        assert!(stdout.contains("Stops any running daemon, then starts a fresh one"));
    }
}
