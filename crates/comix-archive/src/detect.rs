use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::Path;

use tracing::debug;

use crate::format::{ArchiveFormat, TarCompress};

const RAR_MAGIC: &[u8; 4] = b"Rar!";
const SEVEN_ZIP_MAGIC: &[u8; 4] = &[0x37, 0x7A, 0xBC, 0xAF];
const TAR_BLOCK: usize = 512;
const CHECKSUM_FIELD: std::ops::Range<usize> = 148..156;

/// Classify the file at `path`, or `None` when it is not a supported archive.
///
/// Never fails: unreadable, empty or special files are reported as `None`.
pub fn classify(path: impl AsRef<Path>) -> Option<ArchiveFormat> {
    let path = path.as_ref();
    match probe(path) {
        Ok(format) => format,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot classify");
            None
        }
    }
}

fn probe(path: &Path) -> io::Result<Option<ArchiveFormat>> {
    let meta = fs::metadata(path)?;
    if !meta.is_file() {
        return Ok(None);
    }

    let mut file = File::open(path)?;
    if zip::ZipArchive::new(&mut file).is_ok() {
        return Ok(Some(ArchiveFormat::Zip));
    }
    file.rewind()?;

    let mut magic = [0u8; 4];
    let n = read_prefix(&mut file, &mut magic)?;
    let magic = &magic[..n];

    if meta.len() > 0 {
        let compress = TarCompress::from_magic(magic);
        if is_tar(path, compress) {
            return Ok(Some(ArchiveFormat::Tar(compress)));
        }
    }

    Ok(detect_magic(magic))
}

/// Match the non-tar signatures.
pub fn detect_magic(magic: &[u8]) -> Option<ArchiveFormat> {
    match magic {
        m if m.starts_with(RAR_MAGIC) => Some(ArchiveFormat::Rar),
        m if m.starts_with(SEVEN_ZIP_MAGIC) => Some(ArchiveFormat::SevenZip),
        _ => None,
    }
}

fn read_prefix<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(feature = "tar")]
fn is_tar(path: &Path, compress: TarCompress) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut decoder = compress.decoder(file);
    let mut block = [0u8; TAR_BLOCK];
    match decoder.read_exact(&mut block) {
        Ok(()) => is_tar_header(&block),
        Err(_) => false,
    }
}

#[cfg(not(feature = "tar"))]
fn is_tar(_path: &Path, _compress: TarCompress) -> bool {
    false
}

/// Validate the header checksum of a tar block.
///
/// Both the unsigned and the historic signed byte sums are accepted.
pub fn is_tar_header(block: &[u8]) -> bool {
    if block.len() < TAR_BLOCK {
        return false;
    }
    let Some(stored) = parse_octal(&block[CHECKSUM_FIELD]) else {
        return false;
    };

    let mut unsigned: u64 = 0;
    let mut signed: i64 = 0;
    for (i, &b) in block[..TAR_BLOCK].iter().enumerate() {
        let b = if CHECKSUM_FIELD.contains(&i) { b' ' } else { b };
        unsigned += u64::from(b);
        signed += i64::from(b as i8);
    }

    stored == unsigned || i64::try_from(stored).is_ok_and(|s| s == signed)
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let digits: Vec<u8> = field
        .iter()
        .copied()
        .skip_while(|b| *b == b' ')
        .take_while(|b| (b'0'..=b'7').contains(b))
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits
        .iter()
        .try_fold(0u64, |acc, d| acc.checked_mul(8)?.checked_add(u64::from(d - b'0')))
}
