//! Entry point for the `peond` daemon lifecycle command.
//!
//! Delegates to [`peond::run`]. Both the original caller and the detached
//! daemon return through here; only the daemon returns after its workload.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    peond::run(std::env::args_os(), &mut stdout, &mut stderr)
}
