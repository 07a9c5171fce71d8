use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{ArchiveSource, Opener, materialized};
use crate::driver::{Invocation, Operation, Tool, ToolKind, rar};
use crate::error::Result;
use crate::format::ArchiveFormat;

/// RAR through an external `unrar`, one process per entry.
#[derive(Debug)]
pub struct RarSource {
    path: PathBuf,
    tool: Tool,
    password: Option<String>,
    entries: Vec<String>,
}

impl RarSource {
    pub(crate) fn open(path: &Path, opener: &Opener<'_>) -> Result<Self> {
        let tool = opener.ctx.require_tool(ToolKind::Rar, opener.ui)?.clone();

        let password = if needs_password(&tool, path)? {
            info!(path = %path.display(), "rar is encrypted");
            opener.ask_password()
        } else {
            None
        };

        let inv = Invocation::new(path).password(password.as_deref());
        let mut lines = tool.spawn_lines(Operation::List, &inv)?;
        let mut entries = Vec::new();
        while let Some(line) = lines.next_line()? {
            if let Some(name) = rar::listed_name(&line) {
                entries.push(name.to_owned());
            }
        }
        let status = lines.wait()?;
        if !status.success() {
            warn!(path = %path.display(), %status, "rar listing incomplete");
        }

        debug!(path = %path.display(), entries = entries.len(), "listed rar");
        Ok(Self {
            path: path.to_path_buf(),
            tool,
            password,
            entries,
        })
    }
}

fn needs_password(tool: &Tool, path: &Path) -> Result<bool> {
    let mut lines = tool.spawn_lines(Operation::Probe, &Invocation::new(path))?;
    let mut encrypted = false;
    while let Some(line) = lines.next_line()? {
        if rar::marks_encryption(&line) {
            encrypted = true;
            break;
        }
    }
    lines.wait()?;
    Ok(encrypted)
}

impl ArchiveSource for RarSource {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Rar
    }

    fn list_entries(&self) -> &[String] {
        &self.entries
    }

    fn extract_entry(&mut self, name: &str, dst: &Path) -> Result<PathBuf> {
        let inv = Invocation::new(&self.path)
            .password(self.password.as_deref())
            .member(name)
            .dst(dst);
        let status = self.tool.status(Operation::ExtractOne, &inv)?;
        match materialized(dst, name) {
            Ok(path) => {
                if !status.success() {
                    warn!(entry = name, %status, "unrar reported a problem");
                }
                Ok(path)
            }
            Err(e) if status.success() => Err(e),
            Err(_) => Err(self.tool.failed(status)),
        }
    }
}
