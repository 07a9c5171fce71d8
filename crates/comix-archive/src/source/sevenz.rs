use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread;

use tracing::{debug, info, warn};

use super::{ArchiveSource, OnReady, Opener, materialized};
use crate::driver::sevenz::{self, Listing};
use crate::driver::{Invocation, Operation, Tool, ToolKind};
use crate::error::{Error, Result};
use crate::format::ArchiveFormat;
use crate::options::ExtractOptions;
use crate::signal::StopFlag;

/// 7z through an external program.
///
/// Extraction always unpacks the whole archive in one process and follows
/// its progress output.
#[derive(Debug)]
pub struct SevenZipSource {
    path: PathBuf,
    tool: Tool,
    password: Option<String>,
    entries: Vec<String>,
    progress: bool,
    options: ExtractOptions,
}

impl SevenZipSource {
    pub(crate) fn open(path: &Path, opener: &Opener<'_>) -> Result<Self> {
        let tool = opener.ctx.require_tool(ToolKind::SevenZip, opener.ui)?.clone();
        let progress = opener.ctx.sevenzip_progress(&tool);

        let mut listing = list(&tool, path, None, progress)?;
        let mut password = None;
        if listing.needs_password() {
            info!(path = %path.display(), "7z is encrypted");
            password = opener.ask_password();
            match &password {
                Some(pw) if listing.names().is_empty() => {
                    listing = list(&tool, path, Some(pw.as_str()), progress)?;
                }
                Some(_) => {}
                None if listing.names().is_empty() => {
                    return Err(Error::PasswordRequired {
                        path: path.to_path_buf(),
                    });
                }
                None => {}
            }
        }

        let entries = listing.into_names();
        debug!(path = %path.display(), entries = entries.len(), progress, "listed 7z");
        Ok(Self {
            path: path.to_path_buf(),
            tool,
            password,
            entries,
            progress,
            options: opener.options.clone(),
        })
    }
}

fn list(tool: &Tool, path: &Path, password: Option<&str>, progress: bool) -> Result<Listing> {
    let inv = Invocation::new(path).password(password).progress(progress);
    let mut lines = tool.spawn_lines(Operation::List, &inv)?;
    let mut listing = Listing::default();
    while let Some(line) = lines.next_line()? {
        if !listing.feed(&line) {
            break;
        }
    }
    // A non-zero exit is expected when the password is missing.
    let status = lines.wait()?;
    if listing.wrong_password() {
        debug!(path = %path.display(), retried = password.is_some(), "7z refused the password");
    } else if !status.success() && !listing.needs_password() {
        warn!(path = %path.display(), %status, "7z listing incomplete");
    }
    Ok(listing)
}

impl ArchiveSource for SevenZipSource {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::SevenZip
    }

    fn list_entries(&self) -> &[String] {
        &self.entries
    }

    fn extract_entry(&mut self, name: &str, dst: &Path) -> Result<PathBuf> {
        let mut found = None;
        self.extract_all(&[name.to_owned()], dst, &StopFlag::new(), &mut |_, outcome| {
            found = Some(outcome);
        })?;
        found.unwrap_or_else(|| Err(Error::EntryNotFound(name.to_owned())))
    }

    /// Entries are reported as the tool prints them. Whatever it never
    /// mentions is reported once the process exits.
    fn extract_all(
        &mut self,
        order: &[String],
        dst: &Path,
        stop: &StopFlag,
        on_ready: &mut OnReady<'_>,
    ) -> Result<()> {
        if stop.is_set() {
            return Ok(());
        }

        let inv = Invocation::new(&self.path)
            .password(self.password.as_deref())
            .dst(dst)
            .progress(self.progress);
        let mut lines = self.tool.spawn_lines(Operation::ExtractAll, &inv)?;

        let mut pending: HashSet<&str> = order.iter().map(String::as_str).collect();
        let mut signalled = 0;
        while let Some(line) = lines.next_line()? {
            let Some(name) = sevenz::extracted_name(&line) else {
                continue;
            };
            if !pending.remove(name) {
                continue;
            }
            on_ready(name, materialized(dst, name));
            signalled += 1;
            if self.options.should_yield(signalled) {
                thread::sleep(self.options.yield_pause);
            }
        }

        let status = lines.wait()?;
        if !status.success() {
            warn!(path = %self.path.display(), %status, "7z extraction reported errors");
        }
        for name in order {
            if pending.remove(name.as_str()) {
                on_ready(name, materialized(dst, name));
            }
        }
        Ok(())
    }
}
