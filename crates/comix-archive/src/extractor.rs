use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::context::{ArchiveContext, Interaction};
use crate::detect;
use crate::error::{Error, Result};
use crate::format::ArchiveFormat;
use crate::options::ExtractOptions;
use crate::sanitize;
use crate::signal::{FinishGuard, Readiness, StopFlag};
use crate::source::{ArchiveHandle, ArchiveSource, Opener};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Ready,
    Extracting,
    Done,
    Stopped,
    Failed,
}

#[derive(Debug)]
struct Session {
    src: PathBuf,
    dst: PathBuf,
    format: ArchiveFormat,
    entries: Vec<String>,
    order: Vec<String>,
    readiness: Arc<Readiness>,
    stop: StopFlag,
    handle: Option<ArchiveHandle>,
    worker: Option<JoinHandle<()>>,
    started: bool,
}

/// Progressive extraction of one archive at a time.
///
/// [`setup`](Self::setup) lists the archive, [`set_files`](Self::set_files)
/// picks what to extract and in which order, [`extract`](Self::extract) starts
/// a background worker. Readers follow progress through the returned
/// [`Readiness`].
pub struct Extractor {
    ctx: Arc<ArchiveContext>,
    ui: Arc<dyn Interaction>,
    options: ExtractOptions,
    session: Option<Session>,
    failed: bool,
}

impl Extractor {
    pub fn new(ctx: Arc<ArchiveContext>, ui: Arc<dyn Interaction>) -> Self {
        Self {
            ctx,
            ui,
            options: ExtractOptions::default(),
            session: None,
            failed: false,
        }
    }

    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    /// Open `src` for extraction into the existing directory `dst`.
    ///
    /// Any previous archive is stopped and closed first.
    pub fn setup(&mut self, src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<Arc<Readiness>> {
        self.stop();
        self.close();
        self.session = None;

        match self.open(src.as_ref(), dst.as_ref()) {
            Ok(session) => {
                let readiness = Arc::clone(&session.readiness);
                self.session = Some(session);
                self.failed = false;
                Ok(readiness)
            }
            Err(e) => {
                warn!(src = %src.as_ref().display(), error = %e, "archive setup failed");
                self.failed = true;
                Err(e)
            }
        }
    }

    fn open(&self, src: &Path, dst: &Path) -> Result<Session> {
        fs::metadata(src).map_err(|source| Error::Inaccessible {
            path: src.to_path_buf(),
            source,
        })?;
        let dst = fs::canonicalize(dst).map_err(|source| Error::Inaccessible {
            path: dst.to_path_buf(),
            source,
        })?;
        let format = detect::classify(src).ok_or_else(|| Error::UnsupportedFormat {
            path: src.to_path_buf(),
        })?;

        let opener = Opener {
            ctx: &self.ctx,
            ui: self.ui.as_ref(),
            options: &self.options,
        };
        let handle = ArchiveHandle::open(src, format, &opener)?;
        let entries = handle.list_entries().to_vec();
        info!(src = %src.display(), %format, entries = entries.len(), "archive ready");

        Ok(Session {
            src: src.to_path_buf(),
            dst,
            format,
            readiness: Arc::new(Readiness::new(entries.iter().cloned())),
            order: entries.clone(),
            entries,
            stop: StopFlag::new(),
            handle: Some(handle),
            worker: None,
            started: false,
        })
    }

    pub fn state(&self) -> State {
        let Some(session) = &self.session else {
            return if self.failed {
                State::Failed
            } else {
                State::Uninitialized
            };
        };
        if session.stop.is_set() {
            State::Stopped
        } else if !session.started {
            State::Ready
        } else if session.worker.as_ref().is_some_and(|w| !w.is_finished()) {
            State::Extracting
        } else {
            State::Done
        }
    }

    fn expect_state(&self, expected: State) -> Result<()> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(Error::InvalidState { expected, actual })
        }
    }

    pub fn format(&self) -> Option<ArchiveFormat> {
        self.session.as_ref().map(|s| s.format)
    }

    pub fn source(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.src.as_path())
    }

    /// Canonical destination directory.
    pub fn destination(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.dst.as_path())
    }

    /// Every entry in archive order.
    pub fn entries(&self) -> &[String] {
        self.session
            .as_ref()
            .map(|s| s.entries.as_slice())
            .unwrap_or_default()
    }

    /// Entries that will be extracted, in extraction order.
    pub fn get_files(&self) -> Vec<String> {
        self.session
            .as_ref()
            .map(|s| s.order.clone())
            .unwrap_or_default()
    }

    /// Choose the entries to extract and their order.
    ///
    /// Names the archive does not contain are dropped. Compressed tars can
    /// only be read front to back, so for them the request acts as a filter
    /// and archive order is kept.
    pub fn set_files<I, S>(&mut self, files: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expect_state(State::Ready)?;
        let Some(session) = self.session.as_mut() else {
            return Err(Error::InvalidState {
                expected: State::Ready,
                actual: State::Uninitialized,
            });
        };

        let requested: Vec<String> = files.into_iter().map(Into::into).collect();
        let known: HashSet<&str> = session.entries.iter().map(String::as_str).collect();
        for name in requested.iter().filter(|n| !known.contains(n.as_str())) {
            warn!(entry = %name, "ignoring unknown entry");
        }

        session.order = if session.format.is_stream_only() {
            let wanted: HashSet<&str> = requested.iter().map(String::as_str).collect();
            session
                .entries
                .iter()
                .filter(|e| wanted.contains(e.as_str()))
                .cloned()
                .collect()
        } else {
            requested
                .into_iter()
                .filter(|n| known.contains(n.as_str()))
                .collect()
        };
        debug!(files = session.order.len(), "extraction order set");
        Ok(())
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.readiness.is_ready(name))
    }

    pub fn readiness(&self) -> Option<Arc<Readiness>> {
        self.session.as_ref().map(|s| Arc::clone(&s.readiness))
    }

    /// Start extracting on a background thread.
    pub fn extract(&mut self) -> Result<()> {
        self.expect_state(State::Ready)?;
        let Some(session) = self.session.as_mut() else {
            return Err(Error::Closed);
        };
        let handle = session.handle.take().ok_or(Error::Closed)?;

        let job = Job {
            handle,
            order: session.order.clone(),
            dst: session.dst.clone(),
            readiness: Arc::clone(&session.readiness),
            stop: session.stop.clone(),
            remediate: self.options.remediate_names,
        };
        let worker = thread::Builder::new()
            .name("comix-extract".into())
            .spawn(move || job.run())?;

        session.worker = Some(worker);
        session.started = true;
        Ok(())
    }

    /// Wait for the worker without asking it to stop.
    pub fn join(&mut self) {
        if let Some(worker) = self.session.as_mut().and_then(|s| s.worker.take()) {
            if worker.join().is_err() {
                warn!("extraction worker panicked");
            }
        }
    }

    /// Ask the worker to stop and wait for it. Safe to call repeatedly.
    pub fn stop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.worker.is_some() {
            session.stop.set();
            debug!(src = %session.src.display(), "stopping extraction");
        }
        self.join();
    }

    /// Release the archive handle. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut handle) = self.session.as_mut().and_then(|s| s.handle.take()) {
            handle.close();
        }
    }
}

impl Drop for Extractor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("options", &self.options)
            .field("session", &self.session)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

struct Job {
    handle: ArchiveHandle,
    order: Vec<String>,
    dst: PathBuf,
    readiness: Arc<Readiness>,
    stop: StopFlag,
    remediate: bool,
}

impl Job {
    fn run(mut self) {
        let _finish = FinishGuard(Arc::clone(&self.readiness));
        debug!(entries = self.order.len(), dst = %self.dst.display(), "extraction started");

        let readiness = &self.readiness;
        let dst = &self.dst;
        let remediate = self.remediate;
        let mut on_ready = |name: &str, outcome: Result<PathBuf>| {
            let path = match outcome {
                Ok(path) if remediate => Some(remediate_path(dst, path)),
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(entry = name, error = %e, "entry not extracted");
                    None
                }
            };
            readiness.mark(name, path.as_deref());
        };

        if let Err(e) = self
            .handle
            .extract_all(&self.order, dst, &self.stop, &mut on_ready)
        {
            warn!(error = %e, "extraction aborted");
        }

        if !self.stop.is_set() {
            for name in &self.order {
                readiness.mark(name, None);
            }
        }
        self.handle.close();

        info!(
            ready = readiness.ready_count(),
            stopped = self.stop.is_set(),
            "extraction finished"
        );
    }
}

fn remediate_path(dst: &Path, path: PathBuf) -> PathBuf {
    let Some(rel) = path.strip_prefix(dst).ok().and_then(Path::to_str) else {
        return path;
    };
    match sanitize::remediate(dst, rel) {
        Ok(Some(moved)) => moved,
        Ok(None) => path,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot rename entry");
            path
        }
    }
}
