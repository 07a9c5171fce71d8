use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

/// Return the first candidate that resolves on `PATH` and actually starts.
///
/// Each candidate is looked up with `which`, then spawned without arguments.
/// The probe process is killed right away; only the ability to start counts.
pub fn probe<I, S>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    for candidate in candidates {
        let candidate = candidate.as_ref();
        let Ok(path) = which::which(candidate) else {
            debug!(candidate = %candidate.to_string_lossy(), "not on PATH");
            continue;
        };
        let spawned = Command::new(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(mut child) => {
                let _ = child.kill();
                let _ = child.wait();
                debug!(path = %path.display(), "resolved executable");
                return Some(path);
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "candidate failed to start");
            }
        }
    }
    None
}
