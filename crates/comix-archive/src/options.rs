use std::time::Duration;

use encoding_rs::Encoding;

/// Tunables for an [`Extractor`](crate::Extractor).
#[derive(Clone, Debug)]
pub struct ExtractOptions {
    pub yield_every: usize,
    pub yield_pause: Duration,
    pub transcode_names: bool,
    pub fallback_encoding: &'static Encoding,
    pub remediate_names: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            yield_every: 10,
            yield_pause: Duration::from_millis(100),
            transcode_names: cfg!(target_os = "macos"),
            fallback_encoding: encoding_rs::GBK,
            remediate_names: cfg!(windows),
        }
    }
}

impl ExtractOptions {
    /// Pause streaming extractions after this many entries were signalled.
    /// Zero disables the pause.
    pub fn yield_every(mut self, n: usize) -> Self {
        self.yield_every = n;
        self
    }

    pub fn yield_pause(mut self, pause: Duration) -> Self {
        self.yield_pause = pause;
        self
    }

    /// Rewrite non UTF-8 entry names before they are written.
    pub fn transcode_names(mut self, enabled: bool) -> Self {
        self.transcode_names = enabled;
        self
    }

    pub fn fallback_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.fallback_encoding = encoding;
        self
    }

    /// Move written entries with non-ASCII names to an ASCII-safe location.
    pub fn remediate_names(mut self, enabled: bool) -> Self {
        self.remediate_names = enabled;
        self
    }

    /// Name to use on disk for an entry, given the raw bytes stored in the
    /// archive and the name it was listed under.
    pub(crate) fn disk_name(&self, raw: &[u8], listed: &str) -> String {
        if self.transcode_names {
            crate::sanitize::transcode_name(raw, self.fallback_encoding)
        } else {
            listed.to_owned()
        }
    }

    pub(crate) fn should_yield(&self, signalled: usize) -> bool {
        self.yield_every > 0 && signalled > 0 && signalled % self.yield_every == 0
    }
}
