use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Slot {
    ready: bool,
    path: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct Slots {
    entries: HashMap<String, Slot>,
    finished: bool,
}

/// Per-entry readiness shared between an extraction worker and its readers.
///
/// An entry becomes ready once its extraction attempt concluded, whether or
/// not a file was produced. Ready never reverts.
#[derive(Debug, Default)]
pub struct Readiness {
    slots: Mutex<Slots>,
    changed: Condvar,
}

impl Readiness {
    pub(crate) fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = names
            .into_iter()
            .map(|name| (name.into(), Slot::default()))
            .collect();
        Self {
            slots: Mutex::new(Slots {
                entries,
                finished: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.lock().entries.get(name).is_some_and(|slot| slot.ready)
    }

    /// Where the entry was written, once ready and materialized.
    pub fn path_of(&self, name: &str) -> Option<PathBuf> {
        self.lock().entries.get(name).and_then(|slot| slot.path.clone())
    }

    pub fn ready_count(&self) -> usize {
        self.lock().entries.values().filter(|slot| slot.ready).count()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The worker is gone; nothing else will become ready.
    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Block until `name` is ready or the worker is done.
    ///
    /// Returns whether the entry ended up ready.
    pub fn wait_for(&self, name: &str) -> bool {
        let mut slots = self.lock();
        loop {
            match slots.entries.get(name) {
                None => return false,
                Some(slot) if slot.ready => return true,
                Some(_) if slots.finished => return false,
                Some(_) => {}
            }
            slots = self
                .changed
                .wait(slots)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// [`wait_for`](Self::wait_for) with an upper bound.
    pub fn wait_for_timeout(&self, name: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slots = self.lock();
        loop {
            match slots.entries.get(name) {
                None => return false,
                Some(slot) if slot.ready => return true,
                Some(_) if slots.finished => return false,
                Some(_) => {}
            }
            let Some(left) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            slots = self
                .changed
                .wait_timeout(slots, left)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Block until the worker is done.
    pub fn wait_finished(&self) {
        let mut slots = self.lock();
        while !slots.finished {
            slots = self
                .changed
                .wait(slots)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Flag `name` ready. Unknown and already ready names are left alone.
    pub(crate) fn mark(&self, name: &str, path: Option<&Path>) -> bool {
        let mut slots = self.lock();
        let Some(slot) = slots.entries.get_mut(name) else {
            return false;
        };
        if slot.ready {
            return false;
        }
        slot.ready = true;
        slot.path = path.map(Path::to_path_buf);
        drop(slots);
        self.changed.notify_all();
        true
    }

    pub(crate) fn finish(&self) {
        self.lock().finished = true;
        self.changed.notify_all();
    }
}

/// Raises [`Readiness::finish`] when dropped, even on panic.
pub(crate) struct FinishGuard(pub(crate) Arc<Readiness>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Cooperative cancellation, checked between entries.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
