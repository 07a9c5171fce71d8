//! External extractor programs.
//!
//! Each tool keeps a table mapping an [`Operation`] to the argv it needs, next
//! to the parsers for the output that operation prints.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use comix_platform::{Command, LineReader};
use tracing::debug;

use crate::error::{Error, Result};

pub mod rar;
pub mod sevenz;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Rar,
    SevenZip,
}

impl ToolKind {
    /// Program names probed, in order, when none are configured.
    pub fn default_candidates(self) -> &'static [&'static str] {
        match self {
            Self::Rar => &["unrar", "rar"],
            Self::SevenZip => &["7z", "7za", "7zz"],
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rar => "RAR",
            Self::SevenZip => "7z",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Test listing used to find out whether a password is needed.
    Probe,
    List,
    ExtractOne,
    ExtractAll,
    Help,
}

/// Arguments an operation may draw from.
#[derive(Clone, Copy, Debug)]
pub struct Invocation<'a> {
    pub src: &'a Path,
    pub password: Option<&'a str>,
    pub member: Option<&'a str>,
    pub dst: Option<&'a Path>,
    pub progress: bool,
}

impl<'a> Invocation<'a> {
    pub fn new(src: &'a Path) -> Self {
        Self {
            src,
            password: None,
            member: None,
            dst: None,
            progress: false,
        }
    }

    pub fn password(mut self, password: Option<&'a str>) -> Self {
        self.password = password;
        self
    }

    pub fn member(mut self, member: &'a str) -> Self {
        self.member = Some(member);
        self
    }

    pub fn dst(mut self, dst: &'a Path) -> Self {
        self.dst = Some(dst);
        self
    }

    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// `-p<password>`, or `-p-` so the tool never prompts on its own.
    pub(crate) fn password_flag(&self) -> OsString {
        match self.password {
            Some(password) => format!("-p{password}").into(),
            None => OsString::from("-p-"),
        }
    }
}

pub(crate) type ArgvBuilder = fn(&Invocation<'_>) -> Option<Vec<OsString>>;

pub(crate) fn lookup(
    table: &[(Operation, ArgvBuilder)],
    op: Operation,
    inv: &Invocation<'_>,
) -> Option<Vec<OsString>> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == op)
        .and_then(|(_, build)| build(inv))
}

/// A resolved extractor program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tool {
    kind: ToolKind,
    program: PathBuf,
}

impl Tool {
    pub fn new(kind: ToolKind, program: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            program: program.into(),
        }
    }

    /// First candidate that is on `PATH` and starts.
    pub fn resolve<I, S>(kind: ToolKind, candidates: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        comix_platform::probe(candidates).map(|program| Self::new(kind, program))
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn argv(&self, op: Operation, inv: &Invocation<'_>) -> Result<Vec<OsString>> {
        let argv = match self.kind {
            ToolKind::Rar => rar::argv(op, inv),
            ToolKind::SevenZip => sevenz::argv(op, inv),
        };
        argv.ok_or(Error::UnsupportedOperation { tool: self.kind })
    }

    pub fn command(&self, op: Operation, inv: &Invocation<'_>) -> Result<Command> {
        let argv = self.argv(op, inv)?;
        debug!(tool = %self.kind, ?op, "building command");
        Ok(Command::new(&self.program).args(argv))
    }

    /// Start `op` and stream its stdout line by line.
    pub fn spawn_lines(&self, op: Operation, inv: &Invocation<'_>) -> Result<LineReader> {
        Ok(self.command(op, inv)?.spawn_lines()?)
    }

    /// Run `op` to completion with its output discarded.
    pub fn status(&self, op: Operation, inv: &Invocation<'_>) -> Result<ExitStatus> {
        Ok(self.command(op, inv)?.status()?)
    }

    pub(crate) fn failed(&self, status: ExitStatus) -> Error {
        Error::ToolFailed {
            tool: self.program.display().to_string(),
            status,
        }
    }
}

/// Append a trailing separator so tools treat `dir` as a directory.
pub(crate) fn dir_arg(dir: &Path) -> OsString {
    let mut arg = dir.as_os_str().to_owned();
    if !arg.to_string_lossy().ends_with(['/', '\\']) {
        arg.push(std::path::MAIN_SEPARATOR_STR);
    }
    arg
}
