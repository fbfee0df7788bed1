//! Command-line surface for the lifecycle commands.
//!
//! Configuration flags are stripped out before this parser runs, so it only
//! ever sees the program name followed by the command tokens.

use clap::{Parser, Subcommand};
use strum::Display;

/// Controls the peonserver daemon.
#[derive(Parser, Debug)]
#[command(
    name = "peond",
    override_usage = "peond [CONFIG FLAGS] <COMMAND>",
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    /// The lifecycle command to run.
    #[command(subcommand)]
    pub(crate) command: LifecycleCommand,
}

/// Supported lifecycle commands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LifecycleCommand {
    /// Detaches and runs the daemon in the background.
    Start,
    /// Sends termination signals to the recorded daemon until it exits.
    Stop,
    /// Stops any running daemon, then starts a fresh one.
    Restart,
    /// Reports whether the daemon is running.
    Status,
}
