use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ::tar::{Archive, Entry, EntryType};
use tracing::debug;

use super::{ArchiveSource, OnReady, Opener, create_dir, inaccessible, write_stream};
use crate::error::{Error, Result};
use crate::format::{ArchiveFormat, TarCompress};
use crate::options::ExtractOptions;
use crate::sanitize::resolve_within;
use crate::signal::StopFlag;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MemberKind {
    File,
    Directory,
    /// Links, devices and the like are listed but never written.
    Other,
}

impl MemberKind {
    fn of(entry_type: EntryType) -> Self {
        match entry_type {
            EntryType::Regular | EntryType::Continuous => Self::File,
            EntryType::Directory => Self::Directory,
            _ => Self::Other,
        }
    }
}

#[derive(Debug)]
struct Member {
    raw_name: Vec<u8>,
    offset: u64,
    size: u64,
    kind: MemberKind,
}

fn member_name<R: Read>(entry: &Entry<'_, R>) -> (String, Vec<u8>) {
    let raw = entry.path_bytes().into_owned();
    let mut name = String::from_utf8_lossy(&raw).into_owned();
    while name.len() > 1 && name.ends_with('/') {
        name.pop();
    }
    (name, raw)
}

fn materialize<R: Read>(
    reader: &mut R,
    kind: MemberKind,
    disk_name: &str,
    entry: &str,
    dst: &Path,
) -> Result<PathBuf> {
    let target = resolve_within(dst, disk_name)?;
    match kind {
        MemberKind::File => write_stream(reader, &target)?,
        MemberKind::Directory => create_dir(&target)?,
        MemberKind::Other => {
            debug!(entry, "skipping special tar member");
            return Err(Error::NotMaterialized {
                entry: entry.to_owned(),
            });
        }
    }
    Ok(target)
}

/// Uncompressed tar: members are indexed once and read by offset.
#[derive(Debug)]
pub struct TarSource {
    path: PathBuf,
    file: Option<File>,
    entries: Vec<String>,
    members: HashMap<String, Member>,
    options: ExtractOptions,
}

impl TarSource {
    pub(crate) fn open(path: &Path, opener: &Opener<'_>) -> Result<Self> {
        let file = File::open(path).map_err(inaccessible(path))?;
        let mut entries = Vec::new();
        let mut members = HashMap::new();
        {
            let mut archive = Archive::new(&file);
            for entry in archive.entries()? {
                let entry = entry?;
                let (name, raw_name) = member_name(&entry);
                let member = Member {
                    raw_name,
                    offset: entry.raw_file_position(),
                    size: entry.size(),
                    kind: MemberKind::of(entry.header().entry_type()),
                };
                members.insert(name.clone(), member);
                entries.push(name);
            }
        }

        debug!(path = %path.display(), entries = entries.len(), "indexed tar");
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            entries,
            members,
            options: opener.options.clone(),
        })
    }
}

impl ArchiveSource for TarSource {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Tar(TarCompress::None)
    }

    fn list_entries(&self) -> &[String] {
        &self.entries
    }

    fn extract_entry(&mut self, name: &str, dst: &Path) -> Result<PathBuf> {
        let file = self.file.as_mut().ok_or(Error::Closed)?;
        let member = self
            .members
            .get(name)
            .ok_or_else(|| Error::EntryNotFound(name.to_owned()))?;

        file.seek(SeekFrom::Start(member.offset))?;
        let mut data = file.by_ref().take(member.size);
        let disk_name = self.options.disk_name(&member.raw_name, name);
        materialize(&mut data, member.kind, &disk_name, name, dst)
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!(path = %self.path.display(), "closed tar");
        }
    }
}

/// Compressed tar: every pass decodes from the start.
#[derive(Debug)]
pub struct TarStreamSource {
    path: PathBuf,
    compress: TarCompress,
    entries: Vec<String>,
    options: ExtractOptions,
    closed: bool,
}

impl TarStreamSource {
    pub(crate) fn open(path: &Path, compress: TarCompress, opener: &Opener<'_>) -> Result<Self> {
        let file = File::open(path).map_err(inaccessible(path))?;
        let mut archive = Archive::new(compress.decoder(file));
        let mut entries = Vec::new();
        for entry in archive.entries()? {
            entries.push(member_name(&entry?).0);
        }

        debug!(path = %path.display(), %compress, entries = entries.len(), "listed tar stream");
        Ok(Self {
            path: path.to_path_buf(),
            compress,
            entries,
            options: opener.options.clone(),
            closed: false,
        })
    }

    /// One front-to-back pass, handing every wanted member to `visit`.
    /// `visit` returns `false` to end the pass early.
    fn pass<F>(&self, wanted: &HashSet<&str>, stop: &StopFlag, dst: &Path, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, Result<PathBuf>) -> bool,
    {
        if self.closed {
            return Err(Error::Closed);
        }
        let file = File::open(&self.path).map_err(inaccessible(&self.path))?;
        let mut archive = Archive::new(self.compress.decoder(file));
        for entry in archive.entries()? {
            if stop.is_set() {
                debug!("tar pass stopped");
                break;
            }
            let mut entry = entry?;
            let (name, raw_name) = member_name(&entry);
            if !wanted.contains(name.as_str()) {
                continue;
            }
            let kind = MemberKind::of(entry.header().entry_type());
            let disk_name = self.options.disk_name(&raw_name, &name);
            let outcome = materialize(&mut entry, kind, &disk_name, &name, dst);
            if !visit(&name, outcome) {
                break;
            }
        }
        Ok(())
    }
}

impl ArchiveSource for TarStreamSource {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Tar(self.compress)
    }

    fn list_entries(&self) -> &[String] {
        &self.entries
    }

    fn extract_entry(&mut self, name: &str, dst: &Path) -> Result<PathBuf> {
        let wanted = HashSet::from([name]);
        let mut found = None;
        self.pass(&wanted, &StopFlag::new(), dst, |_, outcome| {
            found = Some(outcome);
            false
        })?;
        found.unwrap_or_else(|| Err(Error::EntryNotFound(name.to_owned())))
    }

    /// Entries come out in archive order whatever `order` says.
    fn extract_all(
        &mut self,
        order: &[String],
        dst: &Path,
        stop: &StopFlag,
        on_ready: &mut OnReady<'_>,
    ) -> Result<()> {
        let wanted: HashSet<&str> = order.iter().map(String::as_str).collect();
        self.pass(&wanted, stop, dst, |name, outcome| {
            on_ready(name, outcome);
            true
        })
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ArchiveContext, Headless};
    use std::io::Write;

    fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = ::tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = ::tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn with_opener<T>(f: impl FnOnce(&Opener<'_>) -> T) -> T {
        let ctx = ArchiveContext::new();
        let options = ExtractOptions::default();
        f(&Opener {
            ctx: &ctx,
            ui: &Headless,
            options: &options,
        })
    }

    #[test]
    fn random_access_any_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.cbt");
        std::fs::write(&path, tar_bytes(&[("a.jpg", b"aaa"), ("b.jpg", b"bbbb")])).unwrap();
        let out = tempfile::tempdir().unwrap();

        let mut source = with_opener(|o| TarSource::open(&path, o)).unwrap();
        assert_eq!(source.list_entries(), ["a.jpg", "b.jpg"]);
        let b = source.extract_entry("b.jpg", out.path()).unwrap();
        let a = source.extract_entry("a.jpg", out.path()).unwrap();
        assert_eq!(std::fs::read(b).unwrap(), b"bbbb");
        assert_eq!(std::fs::read(a).unwrap(), b"aaa");
    }

    #[test]
    fn stream_follows_archive_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.tar.gz");
        let data = tar_bytes(&[("a", b"1"), ("b", b"2"), ("c", b"3"), ("d", b"4")]);
        std::fs::write(&path, gzip(&data)).unwrap();
        let out = tempfile::tempdir().unwrap();

        let mut source =
            with_opener(|o| TarStreamSource::open(&path, TarCompress::Gzip, o)).unwrap();
        let mut seen = Vec::new();
        source
            .extract_all(
                &["c".to_owned(), "a".to_owned()],
                out.path(),
                &StopFlag::new(),
                &mut |name, outcome| {
                    assert!(outcome.is_ok());
                    seen.push(name.to_owned());
                },
            )
            .unwrap();
        assert_eq!(seen, ["a", "c"]);
        assert!(!out.path().join("b").exists());
    }

    #[test]
    fn stream_single_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.tar.gz");
        std::fs::write(&path, gzip(&tar_bytes(&[("x", b"1"), ("y", b"22")]))).unwrap();
        let out = tempfile::tempdir().unwrap();

        let mut source =
            with_opener(|o| TarStreamSource::open(&path, TarCompress::Gzip, o)).unwrap();
        let y = source.extract_entry("y", out.path()).unwrap();
        assert_eq!(std::fs::read(y).unwrap(), b"22");
        assert!(matches!(
            source.extract_entry("zzz", out.path()),
            Err(Error::EntryNotFound(_))
        ));
    }

    #[test]
    fn stopped_stream_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.tar.gz");
        std::fs::write(&path, gzip(&tar_bytes(&[("a", b"1")]))).unwrap();
        let out = tempfile::tempdir().unwrap();

        let mut source =
            with_opener(|o| TarStreamSource::open(&path, TarCompress::Gzip, o)).unwrap();
        let stop = StopFlag::new();
        stop.set();
        let mut calls = 0;
        source
            .extract_all(&["a".to_owned()], out.path(), &stop, &mut |_, _| calls += 1)
            .unwrap();
        assert_eq!(calls, 0);
    }

    #[test]
    fn directory_names_lose_trailing_slash() {
        let mut builder = ::tar::Builder::new(Vec::new());
        let mut header = ::tar::Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, "chapter/", &[][..]).unwrap();
        let data = builder.into_inner().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirs.tar");
        std::fs::write(&path, data).unwrap();
        let out = tempfile::tempdir().unwrap();

        let mut source = with_opener(|o| TarSource::open(&path, o)).unwrap();
        assert_eq!(source.list_entries(), ["chapter"]);
        assert!(source.extract_entry("chapter", out.path()).unwrap().is_dir());
    }
}
