use std::borrow::Cow;
use std::fmt::Write as _;
use std::fs;
use std::path::{Component, Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use encoding_rs::Encoding;
use tracing::debug;

use crate::error::{Error, Result};

/// Resolve an archive entry name against `root`.
///
/// `.` and `..` are folded lexically; backslashes count as separators. Absolute
/// names and anything landing outside `root` are rejected.
pub fn resolve_within(root: impl AsRef<Path>, name: &str) -> Result<PathBuf> {
    let root = normalize_path(root.as_ref());
    let entry = entry_path(name);

    let Some(normalized) = normalize_entry(&entry) else {
        return Err(Error::TraversalRejected {
            resolved: root.join(&entry),
            entry,
        });
    };
    if normalized.as_os_str().is_empty() {
        return Err(Error::TraversalRejected {
            entry,
            resolved: root,
        });
    }

    let resolved = root.join(&normalized);
    if !resolved.starts_with(&root) {
        return Err(Error::TraversalRejected { entry, resolved });
    }

    Ok(resolved)
}

fn entry_path(name: &str) -> PathBuf {
    if name.contains('\\') {
        PathBuf::from(name.replace('\\', "/"))
    } else {
        PathBuf::from(name)
    }
}

/// Fold an entry name into plain components. `None` when it is absolute or
/// a `..` climbs above its own top level.
fn normalize_entry(entry: &Path) -> Option<PathBuf> {
    let mut result = PathBuf::new();

    for component in entry.components() {
        match component {
            Component::Normal(part) => result.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(result)
}

/// Normalize relative components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(part) => result.push(part),
            Component::RootDir => result.push(component.as_os_str()),
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
            Component::CurDir => {}
        }
    }

    result
}

/// Turn raw entry-name bytes into a name the destination can store.
///
/// UTF-8 passes through. Otherwise `fallback` is tried and used only when it
/// decodes without replacement; as a last resort non-ASCII bytes are
/// percent-escaped.
pub fn transcode_name(raw: &[u8], fallback: &'static Encoding) -> String {
    if let Ok(name) = std::str::from_utf8(raw) {
        return name.to_owned();
    }
    if let Some(decoded) = fallback.decode_without_bom_handling_and_without_replacement(raw) {
        debug!(encoding = fallback.name(), "decoded legacy entry name");
        return decoded.into_owned();
    }

    let mut escaped = String::with_capacity(raw.len() * 3);
    for &b in raw {
        if b.is_ascii() && b != b'%' {
            escaped.push(char::from(b));
        } else {
            let _ = write!(escaped, "%{b:02X}");
        }
    }
    escaped
}

/// ASCII-only rendering of an entry name.
///
/// Every stem component with non-ASCII characters is replaced by its URL-safe
/// base64 form; the extension is kept as is.
pub fn safe_name(name: &str) -> Cow<'_, str> {
    if name.is_ascii() {
        return Cow::Borrowed(name);
    }

    let (stem, ext) = split_extension(name);
    let parts: Vec<Cow<'_, str>> = stem
        .split(['/', '\\'])
        .map(|part| {
            if part.is_ascii() {
                Cow::Borrowed(part)
            } else {
                Cow::Owned(URL_SAFE.encode(part.as_bytes()))
            }
        })
        .collect();

    Cow::Owned(format!("{}{}", parts.join("/"), ext))
}

fn split_extension(name: &str) -> (&str, &str) {
    let base_start = name.rfind(['/', '\\']).map_or(0, |i| i + 1);
    let base = &name[base_start..];
    match base.rfind('.') {
        Some(dot) if base[..dot].chars().any(|c| c != '.') => name.split_at(base_start + dot),
        _ => (name, ""),
    }
}

/// Move an already written entry to its [`safe_name`].
///
/// Returns the new location, or `None` when the file is missing or the name
/// needed no change.
pub fn remediate(root: impl AsRef<Path>, name: &str) -> Result<Option<PathBuf>> {
    let root = root.as_ref();
    let safe = safe_name(name);
    if safe == name {
        return Ok(None);
    }

    let current = resolve_within(root, name)?;
    if !current.exists() {
        return Ok(None);
    }

    let target = resolve_within(root, &safe)?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    fs::rename(&current, &target).map_err(|e| Error::ExtractionFailed {
        path: target.clone(),
        source: e,
    })?;

    debug!(from = %current.display(), to = %target.display(), "renamed entry");
    Ok(Some(target))
}
