use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdout, Command as StdCommand, ExitStatus, Stdio};

use tracing::debug;

#[derive(Debug)]
pub struct Command {
    inner: StdCommand,
    program: String,
}

impl Command {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        let program = program.as_ref();
        Self {
            inner: StdCommand::new(program),
            program: program.to_string_lossy().into_owned(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.inner.arg(arg);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.inner.args(args);
        self
    }

    /// Run to completion with all standard streams detached.
    pub fn status(mut self) -> Result<ExitStatus> {
        debug!(cmd = %self.program, "running");
        self.inner
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        self.inner.status().map_err(|e| self.failed(e))
    }

    /// Spawn with stdout piped so the caller can consume output while the
    /// process is still running.
    pub fn spawn_lines(mut self) -> Result<LineReader> {
        debug!(cmd = %self.program, "spawning with piped stdout");
        self.inner
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let mut child = self.inner.spawn().map_err(|e| self.failed(e))?;
        let stdout = child.stdout.take().ok_or_else(|| Error::NoStdout {
            cmd: self.program.clone(),
        })?;
        Ok(LineReader {
            child,
            stdout: Some(BufReader::new(stdout)),
            program: self.program,
            reaped: false,
        })
    }

    fn failed(&self, source: std::io::Error) -> Error {
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::CommandNotFound {
                cmd: self.program.clone(),
            }
        } else {
            Error::CommandFailed {
                cmd: self.program.clone(),
                source,
            }
        }
    }
}

/// Line-oriented view over a running child's stdout.
///
/// Lines are decoded lossily and stripped of their `\n` / `\r\n` terminator.
#[derive(Debug)]
pub struct LineReader {
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
    program: String,
    reaped: bool,
}

impl LineReader {
    pub fn next_line(&mut self) -> Result<Option<String>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        let mut buf = Vec::new();
        let n = stdout.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Close the pipe and wait for the process to exit.
    pub fn wait(mut self) -> Result<ExitStatus> {
        self.stdout = None;
        let status = self.child.wait().map_err(|source| Error::CommandFailed {
            cmd: self.program.clone(),
            source,
        })?;
        self.reaped = true;
        Ok(status)
    }
}

impl Drop for LineReader {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        self.stdout = None;
        if let Ok(None) = self.child.try_wait() {
            debug!(cmd = %self.program, "reaping abandoned child");
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}
