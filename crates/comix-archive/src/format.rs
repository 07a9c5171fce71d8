use std::fmt;
use std::io::Read;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Zip,
    Tar(TarCompress),
    Rar,
    SevenZip,
}

/// Compression wrapped around a tar stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TarCompress {
    None,
    Gzip,
    Bzip2,
}

impl ArchiveFormat {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Zip => "ZIP archive",
            Self::Tar(TarCompress::None) => "Tar archive",
            Self::Tar(TarCompress::Gzip) => "Gzip compressed tar archive",
            Self::Tar(TarCompress::Bzip2) => "Bzip2 compressed tar archive",
            Self::Rar => "RAR archive",
            Self::SevenZip => "7z archive",
        }
    }

    /// Formats that can only be decoded front to back.
    ///
    /// Requested orderings are reduced to filters on these.
    pub fn is_stream_only(self) -> bool {
        matches!(self, Self::Tar(TarCompress::Gzip | TarCompress::Bzip2))
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl fmt::Display for TarCompress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
        })
    }
}

impl TarCompress {
    /// Pick the wrapper from the first bytes of the file.
    pub fn from_magic(magic: &[u8]) -> Self {
        match magic {
            [0x1F, 0x8B, ..] => Self::Gzip,
            [b'B', b'Z', b'h', ..] => Self::Bzip2,
            _ => Self::None,
        }
    }

    #[cfg(feature = "tar")]
    pub fn decoder<R: Read>(self, reader: R) -> Decoder<R> {
        match self {
            Self::None => Decoder::Passthrough(reader),
            Self::Gzip => Decoder::Gzip(Box::new(flate2::read::GzDecoder::new(reader))),
            Self::Bzip2 => Decoder::Bzip2(Box::new(bzip2::read::BzDecoder::new(reader))),
        }
    }
}

/// Decoder wrapper for tar decompression.
#[cfg(feature = "tar")]
pub enum Decoder<R> {
    Passthrough(R),
    Gzip(Box<flate2::read::GzDecoder<R>>),
    Bzip2(Box<bzip2::read::BzDecoder<R>>),
}

#[cfg(feature = "tar")]
impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Passthrough(r) => r.read(buf),
            Self::Gzip(d) => d.read(buf),
            Self::Bzip2(d) => d.read(buf),
        }
    }
}
