use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::{Error, Result};

/// Files to bundle into a comic zip.
#[derive(Clone, Debug)]
pub struct PackRequest {
    /// Pages, in reading order.
    pub images: Vec<PathBuf>,
    /// Anything else worth keeping, such as metadata files.
    pub extras: Vec<PathBuf>,
    pub destination: PathBuf,
    pub base_name: String,
}

impl PackRequest {
    pub fn new(
        images: Vec<PathBuf>,
        extras: Vec<PathBuf>,
        destination: impl Into<PathBuf>,
        base_name: impl Into<String>,
    ) -> Self {
        Self {
            images,
            extras,
            destination: destination.into(),
            base_name: base_name.into(),
        }
    }
}

/// Writes a [`PackRequest`] on a background thread.
#[derive(Debug)]
pub struct Packer {
    request: Option<PackRequest>,
    worker: Option<JoinHandle<bool>>,
    outcome: Option<bool>,
}

impl Packer {
    pub fn new(request: PackRequest) -> Self {
        Self {
            request: Some(request),
            worker: None,
            outcome: None,
        }
    }

    /// Start packing. Later calls do nothing.
    pub fn pack(&mut self) {
        let Some(request) = self.request.take() else {
            debug!("packer already started");
            return;
        };
        let spawned = thread::Builder::new()
            .name("comix-pack".into())
            .spawn(move || match write_archive(&request) {
                Ok(()) => {
                    info!(path = %request.destination.display(), "archive packed");
                    true
                }
                Err(e) => {
                    warn!(path = %request.destination.display(), error = %e, "packing failed");
                    false
                }
            });
        match spawned {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => {
                warn!(error = %e, "cannot start packer thread");
                self.outcome = Some(false);
            }
        }
    }

    /// Block until packing is over. `false` when it failed or never ran.
    pub fn wait(&mut self) -> bool {
        if let Some(worker) = self.worker.take() {
            let ok = worker.join().unwrap_or_else(|_| {
                warn!("packer thread panicked");
                false
            });
            self.outcome = Some(ok);
        }
        self.outcome.unwrap_or(false)
    }
}

impl Drop for Packer {
    fn drop(&mut self) {
        self.wait();
    }
}

const MIN_INDEX_WIDTH: usize = 2;

/// Entry names for pages: a zero-padded index, the base name, the original
/// extension.
pub fn page_names(images: &[PathBuf], base_name: &str) -> Vec<String> {
    let width = images.len().to_string().len().max(MIN_INDEX_WIDTH);
    images
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let ext = path
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default();
            format!("{:0width$} - {base_name}{ext}", i + 1)
        })
        .collect()
}

/// Prefix `name` with underscores until it is not in `used`.
pub fn unique_name(name: &str, used: &HashSet<String>) -> String {
    let mut candidate = name.to_owned();
    while used.contains(&candidate) {
        candidate.insert(0, '_');
    }
    candidate
}

/// Write the archive synchronously. A partial file is removed on failure.
pub fn write_archive(request: &PackRequest) -> Result<()> {
    let dest = &request.destination;
    let file = File::create(dest).map_err(|source| Error::PackCreate {
        path: dest.clone(),
        source,
    })?;

    let result = write_entries(ZipWriter::new(file), request);
    if result.is_err() {
        if let Err(e) = fs::remove_file(dest) {
            debug!(path = %dest.display(), error = %e, "cannot remove partial archive");
        }
    }
    result
}

fn write_entries(mut zip: ZipWriter<File>, request: &PackRequest) -> Result<()> {
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut used = HashSet::new();

    for (path, name) in request
        .images
        .iter()
        .zip(page_names(&request.images, &request.base_name))
    {
        add_file(&mut zip, path, &name, stored)?;
        used.insert(name);
    }

    for path in &request.extras {
        let Some(base) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Err(Error::PackWrite {
                path: path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "no file name"),
            });
        };
        let name = unique_name(&base, &used);
        add_file(&mut zip, path, &name, deflated)?;
        used.insert(name);
    }

    let file = zip.finish()?;
    file.sync_all().map_err(|source| Error::PackWrite {
        path: request.destination.clone(),
        source,
    })?;
    Ok(())
}

fn add_file(
    zip: &mut ZipWriter<File>,
    path: &Path,
    name: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    let wrap = |source| Error::PackWrite {
        path: path.to_path_buf(),
        source,
    };
    let mut input = File::open(path).map_err(wrap)?;
    zip.start_file(name, options)?;
    io::copy(&mut input, zip).map_err(wrap)?;
    debug!(entry = name, "packed");
    Ok(())
}
