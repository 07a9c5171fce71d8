//! Per-format readers behind one interface.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::context::{ArchiveContext, Interaction};
use crate::error::{Error, Result};
use crate::format::ArchiveFormat;
use crate::options::ExtractOptions;
use crate::signal::StopFlag;

mod rar;
mod sevenz;
#[cfg(feature = "tar")]
mod tar;
mod zip;

pub use self::rar::RarSource;
pub use self::sevenz::SevenZipSource;
#[cfg(feature = "tar")]
pub use self::tar::{TarSource, TarStreamSource};
pub use self::zip::ZipSource;

/// Receives each entry once its extraction attempt is over.
pub type OnReady<'a> = dyn FnMut(&str, Result<PathBuf>) + 'a;

pub trait ArchiveSource: Send {
    fn format(&self) -> ArchiveFormat;

    /// Entry names in archive order.
    fn list_entries(&self) -> &[String];

    /// Write one entry below `dst` and return where it landed.
    fn extract_entry(&mut self, name: &str, dst: &Path) -> Result<PathBuf>;

    /// Extract `order`, reporting every entry to `on_ready`.
    ///
    /// `stop` is honored between entries. An `Err` means the remaining entries
    /// were never attempted.
    fn extract_all(
        &mut self,
        order: &[String],
        dst: &Path,
        stop: &StopFlag,
        on_ready: &mut OnReady<'_>,
    ) -> Result<()> {
        for name in order {
            if stop.is_set() {
                break;
            }
            let outcome = self.extract_entry(name, dst);
            on_ready(name, outcome);
        }
        Ok(())
    }

    /// Release file handles. Further extraction fails with [`Error::Closed`].
    fn close(&mut self) {}
}

/// What a source may need while opening: tools, prompts and tunables.
pub(crate) struct Opener<'a> {
    pub ctx: &'a ArchiveContext,
    pub ui: &'a dyn Interaction,
    pub options: &'a ExtractOptions,
}

impl Opener<'_> {
    pub fn ask_password(&self) -> Option<String> {
        self.ctx.ask_password(self.ui)
    }
}

#[derive(Debug)]
pub enum ArchiveHandle {
    Zip(ZipSource),
    #[cfg(feature = "tar")]
    Tar(TarSource),
    #[cfg(feature = "tar")]
    TarStream(TarStreamSource),
    Rar(RarSource),
    SevenZip(SevenZipSource),
}

impl ArchiveHandle {
    pub(crate) fn open(path: &Path, format: ArchiveFormat, opener: &Opener<'_>) -> Result<Self> {
        match format {
            ArchiveFormat::Zip => Ok(Self::Zip(ZipSource::open(path, opener)?)),
            #[cfg(feature = "tar")]
            ArchiveFormat::Tar(crate::format::TarCompress::None) => {
                Ok(Self::Tar(TarSource::open(path, opener)?))
            }
            #[cfg(feature = "tar")]
            ArchiveFormat::Tar(compress) => {
                Ok(Self::TarStream(TarStreamSource::open(path, compress, opener)?))
            }
            #[cfg(not(feature = "tar"))]
            ArchiveFormat::Tar(_) => Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
            ArchiveFormat::Rar => Ok(Self::Rar(RarSource::open(path, opener)?)),
            ArchiveFormat::SevenZip => Ok(Self::SevenZip(SevenZipSource::open(path, opener)?)),
        }
    }

    fn inner(&self) -> &dyn ArchiveSource {
        match self {
            Self::Zip(s) => s,
            #[cfg(feature = "tar")]
            Self::Tar(s) => s,
            #[cfg(feature = "tar")]
            Self::TarStream(s) => s,
            Self::Rar(s) => s,
            Self::SevenZip(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ArchiveSource {
        match self {
            Self::Zip(s) => s,
            #[cfg(feature = "tar")]
            Self::Tar(s) => s,
            #[cfg(feature = "tar")]
            Self::TarStream(s) => s,
            Self::Rar(s) => s,
            Self::SevenZip(s) => s,
        }
    }
}

impl ArchiveSource for ArchiveHandle {
    fn format(&self) -> ArchiveFormat {
        self.inner().format()
    }

    fn list_entries(&self) -> &[String] {
        self.inner().list_entries()
    }

    fn extract_entry(&mut self, name: &str, dst: &Path) -> Result<PathBuf> {
        self.inner_mut().extract_entry(name, dst)
    }

    fn extract_all(
        &mut self,
        order: &[String],
        dst: &Path,
        stop: &StopFlag,
        on_ready: &mut OnReady<'_>,
    ) -> Result<()> {
        self.inner_mut().extract_all(order, dst, stop, on_ready)
    }

    fn close(&mut self) {
        self.inner_mut().close();
    }
}

pub(crate) fn create_parent(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

pub(crate) fn create_dir(target: &Path) -> Result<()> {
    fs::create_dir_all(target).map_err(|e| Error::DirectoryCreationFailed {
        path: target.to_path_buf(),
        source: e,
    })
}

/// Copy `reader` into a fresh file at `target`, creating parents.
pub(crate) fn write_stream<R: Read + ?Sized>(reader: &mut R, target: &Path) -> Result<()> {
    create_parent(target)?;
    let mut file = File::create(target).map_err(|e| Error::ExtractionFailed {
        path: target.to_path_buf(),
        source: e,
    })?;
    io::copy(reader, &mut file).map_err(|e| Error::ExtractionFailed {
        path: target.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

pub(crate) fn inaccessible(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |source| Error::Inaccessible {
        path: path.to_path_buf(),
        source,
    }
}

/// An external tool reported success for `name`; check the file is there.
pub(crate) fn materialized(dst: &Path, name: &str) -> Result<PathBuf> {
    let path = crate::sanitize::resolve_within(dst, name)?;
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::NotMaterialized {
            entry: name.to_owned(),
        })
    }
}
