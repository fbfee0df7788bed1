use std::fmt;
use std::io::{self, Write};

/// Output handle abstracting over stdout/stderr writers.
pub struct LifecycleOutput<W: Write, E: Write> {
    pub stdout: W,
    pub stderr: E,
}

impl<W: Write, E: Write> LifecycleOutput<W, E> {
    pub fn new(stdout: W, stderr: E) -> Self {
        Self { stdout, stderr }
    }

    pub fn stdout_line(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        write_line(&mut self.stdout, args)
    }

    pub fn stderr_line(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        write_line(&mut self.stderr, args)
    }
}

fn write_line(writer: &mut impl Write, args: fmt::Arguments<'_>) -> io::Result<()> {
    writer.write_fmt(args)?;
    writer.write_all(b"\n")?;
    writer.flush()
}
