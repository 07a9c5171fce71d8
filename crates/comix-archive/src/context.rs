use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::{Mutex, PoisonError};

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::driver::{Tool, ToolKind, sevenz};
use crate::error::{Error, Result};

/// Blocking questions the archive layer delegates to its host.
pub trait Interaction: Send + Sync {
    /// Ask for a password, pre-filled with `default`. `None` means cancelled.
    fn request_password(&self, default: &str) -> Option<String>;

    /// Tell the user that no extractor program for `kind` could be found.
    fn notify_missing_tool(&self, kind: ToolKind);
}

/// An [`Interaction`] without a user: never supplies passwords.
#[derive(Clone, Copy, Debug, Default)]
pub struct Headless;

impl Interaction for Headless {
    fn request_password(&self, _default: &str) -> Option<String> {
        debug!("password requested without an interactive host");
        None
    }

    fn notify_missing_tool(&self, kind: ToolKind) {
        warn!(%kind, "no extractor program available");
    }
}

/// Process-scoped state shared by every extractor.
///
/// Tool lookups run at most once per context and remember failures too. The
/// last password entered is kept in memory only.
#[derive(Debug, Default)]
pub struct ArchiveContext {
    rar: OnceCell<Option<Tool>>,
    sevenzip: OnceCell<Option<Tool>>,
    sevenzip_progress: OnceCell<bool>,
    last_password: Mutex<String>,
    candidates: HashMap<ToolKind, Vec<OsString>>,
}

impl ArchiveContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the program names probed for `kind`.
    pub fn with_candidates<I, S>(mut self, kind: ToolKind, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.candidates
            .insert(kind, names.into_iter().map(Into::into).collect());
        self
    }

    pub fn candidates(&self, kind: ToolKind) -> Vec<OsString> {
        match self.candidates.get(&kind) {
            Some(names) => names.clone(),
            None => kind
                .default_candidates()
                .iter()
                .map(OsString::from)
                .collect(),
        }
    }

    /// The resolved program for `kind`, probing on first use.
    pub fn tool(&self, kind: ToolKind) -> Option<&Tool> {
        let slot = match kind {
            ToolKind::Rar => &self.rar,
            ToolKind::SevenZip => &self.sevenzip,
        };
        slot.get_or_init(|| {
            let tool = Tool::resolve(kind, self.candidates(kind));
            match &tool {
                Some(tool) => debug!(%kind, program = %tool.program().display(), "extractor resolved"),
                None => warn!(%kind, "no extractor found"),
            }
            tool
        })
        .as_ref()
    }

    /// Like [`tool`](Self::tool), but reports a miss to the host.
    pub fn require_tool(&self, kind: ToolKind, ui: &dyn Interaction) -> Result<&Tool> {
        match self.tool(kind) {
            Some(tool) => Ok(tool),
            None => {
                ui.notify_missing_tool(kind);
                let tried = self
                    .candidates(kind)
                    .iter()
                    .map(|c| c.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(Error::MissingTool { kind, tried })
            }
        }
    }

    /// Whether the 7z program accepts the `-bb` progress switches.
    pub fn sevenzip_progress(&self, tool: &Tool) -> bool {
        *self
            .sevenzip_progress
            .get_or_init(|| sevenz::supports_progress(tool))
    }

    pub fn last_password(&self) -> String {
        self.last_password
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remember_password(&self, password: &str) {
        let mut last = self
            .last_password
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        password.clone_into(&mut last);
    }

    /// Prompt through `ui`, pre-filled with the last password, and remember
    /// the answer.
    pub fn ask_password(&self, ui: &dyn Interaction) -> Option<String> {
        let answer = ui.request_password(&self.last_password())?;
        self.remember_password(&answer);
        Some(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        answer: Option<&'static str>,
        seen_default: Mutex<Option<String>>,
        missing: AtomicUsize,
    }

    impl Interaction for Scripted {
        fn request_password(&self, default: &str) -> Option<String> {
            *self.seen_default.lock().unwrap() = Some(default.to_owned());
            self.answer.map(str::to_owned)
        }

        fn notify_missing_tool(&self, _kind: ToolKind) {
            self.missing.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn scripted(answer: Option<&'static str>) -> Scripted {
        Scripted {
            answer,
            seen_default: Mutex::new(None),
            missing: AtomicUsize::new(0),
        }
    }

    #[test]
    fn default_candidates() {
        let ctx = ArchiveContext::new();
        assert_eq!(ctx.candidates(ToolKind::Rar), ["unrar", "rar"]);
        assert_eq!(ctx.candidates(ToolKind::SevenZip), ["7z", "7za", "7zz"]);
    }

    #[test]
    fn candidate_override() {
        let ctx = ArchiveContext::new().with_candidates(ToolKind::Rar, ["my-unrar"]);
        assert_eq!(ctx.candidates(ToolKind::Rar), ["my-unrar"]);
        assert_eq!(ctx.candidates(ToolKind::SevenZip).len(), 3);
    }

    #[test]
    fn missing_tool_is_cached_and_reported() {
        let ctx = ArchiveContext::new()
            .with_candidates(ToolKind::Rar, ["nonexistent_binary_12345"]);
        let ui = scripted(None);
        assert!(matches!(
            ctx.require_tool(ToolKind::Rar, &ui),
            Err(Error::MissingTool { kind: ToolKind::Rar, .. })
        ));
        assert!(ctx.require_tool(ToolKind::Rar, &ui).is_err());
        assert_eq!(ui.missing.load(Ordering::SeqCst), 2);
        assert!(ctx.rar.get().is_some_and(Option::is_none));
    }

    #[test]
    fn password_prompt_prefills_last_password() {
        let ctx = ArchiveContext::new();
        ctx.remember_password("previous");
        let ui = scripted(Some("fresh"));
        assert_eq!(ctx.ask_password(&ui).as_deref(), Some("fresh"));
        assert_eq!(ui.seen_default.lock().unwrap().as_deref(), Some("previous"));
        assert_eq!(ctx.last_password(), "fresh");
    }

    #[test]
    fn cancelled_prompt_keeps_last_password() {
        let ctx = ArchiveContext::new();
        ctx.remember_password("kept");
        assert_eq!(ctx.ask_password(&scripted(None)), None);
        assert_eq!(ctx.last_password(), "kept");
    }

    #[test]
    fn headless_never_answers() {
        assert_eq!(Headless.request_password("x"), None);
    }
}
