use std::fs::File;
use std::path::{Path, PathBuf};

use ::zip::ZipArchive;
use ::zip::result::ZipError;
use tracing::{debug, info};

use super::{ArchiveSource, Opener, create_dir, inaccessible, write_stream};
use crate::error::{Error, Result};
use crate::format::ArchiveFormat;
use crate::options::ExtractOptions;
use crate::sanitize::resolve_within;

/// Random-access zip reader.
pub struct ZipSource {
    path: PathBuf,
    archive: Option<ZipArchive<File>>,
    entries: Vec<String>,
    password: Option<String>,
    options: ExtractOptions,
}

impl ZipSource {
    pub(crate) fn open(path: &Path, opener: &Opener<'_>) -> Result<Self> {
        let file = File::open(path).map_err(inaccessible(path))?;
        let mut archive = ZipArchive::new(file)?;

        let mut entries = Vec::with_capacity(archive.len());
        let mut encrypted = false;
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            encrypted |= entry.encrypted();
            entries.push(entry.name().to_owned());
        }

        let password = if encrypted {
            info!(path = %path.display(), "zip has encrypted entries");
            opener.ask_password()
        } else {
            None
        };

        debug!(path = %path.display(), entries = entries.len(), "opened zip");
        Ok(Self {
            path: path.to_path_buf(),
            archive: Some(archive),
            entries,
            password,
            options: opener.options.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for ZipSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipSource")
            .field("path", &self.path)
            .field("open", &self.archive.is_some())
            .field("entries", &self.entries.len())
            .field("encrypted", &self.password.is_some())
            .finish()
    }
}

impl ArchiveSource for ZipSource {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn list_entries(&self) -> &[String] {
        &self.entries
    }

    fn extract_entry(&mut self, name: &str, dst: &Path) -> Result<PathBuf> {
        let archive = self.archive.as_mut().ok_or(Error::Closed)?;
        let lookup = match &self.password {
            Some(password) => archive.by_name_decrypt(name, password.as_bytes()),
            None => archive.by_name(name),
        };
        let mut entry = lookup.map_err(|e| match e {
            ZipError::FileNotFound => Error::EntryNotFound(name.to_owned()),
            e => e.into(),
        })?;

        let disk_name = self.options.disk_name(entry.name_raw(), name);
        let target = resolve_within(dst, &disk_name)?;
        if entry.is_dir() {
            create_dir(&target)?;
        } else {
            write_stream(&mut entry, &target)?;
        }
        Ok(target)
    }

    fn close(&mut self) {
        if self.archive.take().is_some() {
            debug!(path = %self.path.display(), "closed zip");
        }
    }
}
