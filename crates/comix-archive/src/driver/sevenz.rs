use std::ffi::OsString;

use tracing::debug;

use super::{ArgvBuilder, Invocation, Operation, Tool, lookup};

const TABLE: &[(Operation, ArgvBuilder)] = &[
    (Operation::List, list),
    (Operation::ExtractAll, extract_all),
    (Operation::Help, help),
];

const ENTRIES_SEPARATOR: &str = "----------";
const WRONG_PASSWORD: &str = "Wrong password?";
const DATA_ERROR_SUFFIX: &str = "     Data Error in encrypted file. Wrong password?";

pub fn argv(op: Operation, inv: &Invocation<'_>) -> Option<Vec<OsString>> {
    lookup(TABLE, op, inv)
}

fn list(inv: &Invocation<'_>) -> Option<Vec<OsString>> {
    let mut args: Vec<OsString> = vec!["l".into(), "-slt".into(), inv.password_flag()];
    if inv.progress {
        // Errors such as a wrong password go to stderr otherwise.
        args.push("-bse1".into());
    }
    args.push(inv.src.into());
    Some(args)
}

fn extract_all(inv: &Invocation<'_>) -> Option<Vec<OsString>> {
    let mut args: Vec<OsString> = vec!["x".into(), inv.password_flag(), "-y".into(), "-bd".into()];
    if inv.progress {
        args.push("-bb1".into());
        args.push("-bse1".into());
    }
    let mut out = OsString::from("-o");
    out.push(inv.dst?);
    args.push(out);
    args.push(inv.src.into());
    Some(args)
}

fn help(_inv: &Invocation<'_>) -> Option<Vec<OsString>> {
    Some(vec!["-h".into()])
}

/// Accumulates a technical (`-slt`) listing.
///
/// `Path = ` lines before the separator describe the archive itself and are
/// only used when the separator never shows up.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Listing {
    header_paths: Vec<String>,
    entry_paths: Vec<String>,
    in_entries: bool,
    encrypted: bool,
    wrong_password: bool,
}

impl Listing {
    /// Consume one line; `false` once the rest of the output is irrelevant.
    pub fn feed(&mut self, line: &str) -> bool {
        if line.starts_with(ENTRIES_SEPARATOR) {
            self.in_entries = true;
        } else if let Some(path) = line.strip_prefix("Path = ") {
            if self.in_entries {
                self.entry_paths.push(path.to_owned());
            } else {
                self.header_paths.push(path.to_owned());
            }
        } else if line.starts_with("Encrypted = +") {
            self.encrypted = true;
        } else if line.contains(WRONG_PASSWORD) {
            debug!("listing rejected the password");
            self.wrong_password = true;
            self.entry_paths.clear();
            self.header_paths.clear();
            return false;
        }
        true
    }

    pub fn names(&self) -> &[String] {
        if self.in_entries {
            &self.entry_paths
        } else {
            &self.header_paths
        }
    }

    pub fn into_names(self) -> Vec<String> {
        if self.in_entries {
            self.entry_paths
        } else {
            self.header_paths
        }
    }

    pub fn needs_password(&self) -> bool {
        self.encrypted || self.wrong_password
    }

    pub fn wrong_password(&self) -> bool {
        self.wrong_password
    }
}

/// Entry name from a progress line printed while extracting.
///
/// Old releases print `Extracting  <name>`, newer ones `- <name>` with `-bb1`.
pub fn extracted_name(line: &str) -> Option<&str> {
    let name = if let Some(rest) = line.strip_prefix("Extracting  ") {
        rest.strip_suffix(DATA_ERROR_SUFFIX).unwrap_or(rest)
    } else {
        line.strip_prefix("- ").or_else(|| line.strip_prefix("T "))?
    };
    (!name.is_empty()).then_some(name)
}

/// A help line advertising the `-bb` output-level switch.
pub fn advertises_progress(line: &str) -> bool {
    line.contains("-bb[0-3]")
}

/// Ask the program whether it knows `-bb`.
pub fn supports_progress(tool: &Tool) -> bool {
    let inv = Invocation::new(tool.program());
    let mut lines = match tool.spawn_lines(Operation::Help, &inv) {
        Ok(lines) => lines,
        Err(e) => {
            debug!(error = %e, "7z help unavailable");
            return false;
        }
    };
    let mut supported = false;
    while let Ok(Some(line)) = lines.next_line() {
        if advertises_progress(&line) {
            supported = true;
            break;
        }
    }
    let _ = lines.wait();
    debug!(supported, "7z progress switches");
    supported
}
