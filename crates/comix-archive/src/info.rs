use std::fs;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::context::{ArchiveContext, Interaction};
use crate::extractor::Extractor;
use crate::format::ArchiveFormat;

static IMAGE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(jpg|jpeg|png|gif|tif|tiff|bmp)\s*$").expect("valid image name regex")
});

/// Whether an entry name looks like a page.
pub fn is_image_name(name: &str) -> bool {
    IMAGE_NAME.is_match(name)
}

/// Summary shown before opening an archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub format: ArchiveFormat,
    pub pages: usize,
    /// Size of the archive file in bytes.
    pub size: u64,
}

impl ArchiveInfo {
    /// List `path` without extracting anything. `None` if it cannot be opened.
    pub fn read(
        path: impl AsRef<Path>,
        ctx: Arc<ArchiveContext>,
        ui: Arc<dyn Interaction>,
    ) -> Option<Self> {
        let path = path.as_ref();
        let scratch = tempfile::tempdir().ok()?;
        let mut extractor = Extractor::new(ctx, ui);
        if let Err(e) = extractor.setup(path, scratch.path()) {
            debug!(path = %path.display(), error = %e, "no archive info");
            return None;
        }
        let format = extractor.format()?;
        let pages = extractor
            .get_files()
            .iter()
            .filter(|name| is_image_name(name))
            .count();
        extractor.close();

        let size = fs::metadata(path).ok()?.len();
        Some(Self {
            format,
            pages,
            size,
        })
    }
}
