//! RAR and 7z paths, driven by shell-script stand-ins for the real tools.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use comix_archive::{
    ArchiveContext, ArchiveFormat, Error, ExtractOptions, Extractor, Headless, Interaction,
    State, ToolKind,
};
use once_cell::sync::Lazy;
use tempfile::{TempDir, tempdir};

const FAKE_7Z: &str = r#"#!/bin/sh
pw=""
out=""
for a in "$@"; do
  case "$a" in
    -p*) pw="${a#-p}" ;;
    -o*) out="${a#-o}" ;;
  esac
done
case "$1" in
  -h)
    echo "Usage: 7z <command> [<switches>...] <archive_name>"
    echo "  -bb[0-3] : set output log level"
    ;;
  l)
    if [ "$FAKE_LOCKED" = 1 ] && [ "$pw" != "secret" ]; then
      echo "ERROR: archive : Can not open encrypted archive. Wrong password?"
      exit 2
    fi
    echo "Path = archive"
    echo "Type = 7z"
    echo
    echo "----------"
    echo "Path = 01.jpg"
    echo "Encrypted = -"
    echo
    echo "Path = sub/02.jpg"
    echo "Encrypted = -"
    echo
    echo "Path = 03.jpg"
    echo "Encrypted = -"
    ;;
  x)
    mkdir -p "$out/sub"
    printf one > "$out/01.jpg"
    echo "- 01.jpg"
    if [ "$FAKE_SLOW" = 1 ]; then
      sleep 2
    fi
    printf two > "$out/sub/02.jpg"
    echo "- sub/02.jpg"
    printf three > "$out/03.jpg"
    echo "Everything is Ok"
    ;;
esac
exit 0
"#;

const FAKE_UNRAR: &str = r#"#!/bin/sh
locked() {
  [ "$FAKE_LOCKED" = 1 ] && [ "$1" != "-psecret" ]
}
case "$1" in
  l)
    if [ "$FAKE_LOCKED" = 1 ]; then
      echo "*01.jpg"
    fi
    echo " 01.jpg"
    echo " broken.jpg"
    ;;
  vb)
    if locked "$2"; then
      exit 10
    fi
    echo "01.jpg"
    echo
    echo "broken.jpg"
    ;;
  x)
    if locked "$3"; then
      exit 11
    fi
    member="$8"
    dst="$9"
    if [ "$member" = "broken.jpg" ]; then
      exit 3
    fi
    mkdir -p "$dst"
    printf page > "$dst$member"
    ;;
esac
exit 0
"#;

struct FakeTools {
    _dir: TempDir,
    sevenzip: PathBuf,
    locked_sevenzip: PathBuf,
    slow_sevenzip: PathBuf,
    unrar: PathBuf,
    locked_unrar: PathBuf,
}

fn with_env(dir: &Path, name: &str, var: &str, target: &Path) -> PathBuf {
    let body = format!("#!/bin/sh\n{var}=1 exec '{}' \"$@\"\n", target.display());
    install(dir, name, &body)
}

fn install(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

// Written once per test binary so no script is executed while still open.
static TOOLS: Lazy<FakeTools> = Lazy::new(|| {
    let dir = tempdir().unwrap();
    let sevenzip = install(dir.path(), "fake7z", FAKE_7Z);
    let locked_sevenzip = with_env(dir.path(), "fake7z-locked", "FAKE_LOCKED", &sevenzip);
    let slow_sevenzip = with_env(dir.path(), "fake7z-slow", "FAKE_SLOW", &sevenzip);
    let unrar = install(dir.path(), "fakeunrar", FAKE_UNRAR);
    let locked_unrar = with_env(dir.path(), "fakeunrar-locked", "FAKE_LOCKED", &unrar);
    FakeTools {
        _dir: dir,
        sevenzip,
        locked_sevenzip,
        slow_sevenzip,
        unrar,
        locked_unrar,
    }
});

fn context() -> Arc<ArchiveContext> {
    Arc::new(
        ArchiveContext::new()
            .with_candidates(ToolKind::SevenZip, [&TOOLS.sevenzip])
            .with_candidates(ToolKind::Rar, [&TOOLS.unrar]),
    )
}

fn seven_zip_file(dir: &Path) -> PathBuf {
    let path = dir.join("book.cb7");
    fs::write(&path, [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0x00, 0x04]).unwrap();
    path
}

fn rar_file(dir: &Path) -> PathBuf {
    let path = dir.join("book.cbr");
    fs::write(&path, b"Rar!\x1a\x07\x00fake").unwrap();
    path
}

#[derive(Default)]
struct Recorder {
    password: Option<&'static str>,
    asked: AtomicUsize,
    missing: AtomicUsize,
}

impl Interaction for Recorder {
    fn request_password(&self, _default: &str) -> Option<String> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.password.map(str::to_owned)
    }

    fn notify_missing_tool(&self, _kind: ToolKind) {
        self.missing.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_seven_zip_lists_and_extracts() {
    let dir = tempdir().unwrap();
    let src = seven_zip_file(dir.path());
    let out = tempdir().unwrap();

    let ctx = context();
    let mut ex = Extractor::new(Arc::clone(&ctx), Arc::new(Headless));
    let readiness = ex.setup(&src, out.path()).unwrap();
    assert_eq!(ex.format(), Some(ArchiveFormat::SevenZip));
    assert_eq!(ex.get_files(), ["01.jpg", "sub/02.jpg", "03.jpg"]);

    ex.extract().unwrap();
    ex.join();

    for name in ["01.jpg", "sub/02.jpg", "03.jpg"] {
        assert!(readiness.is_ready(name), "{name}");
        assert!(readiness.path_of(name).is_some(), "{name}");
    }
    assert_eq!(fs::read(out.path().join("sub/02.jpg")).unwrap(), b"two");
    assert!(ctx.tool(ToolKind::SevenZip).is_some());
}

#[test]
fn test_seven_zip_entries_ready_while_running() {
    let dir = tempdir().unwrap();
    let src = seven_zip_file(dir.path());
    let out = tempdir().unwrap();

    let ctx = Arc::new(
        ArchiveContext::new().with_candidates(ToolKind::SevenZip, [&TOOLS.slow_sevenzip]),
    );
    let mut ex = Extractor::new(ctx, Arc::new(Headless));
    let readiness = ex.setup(&src, out.path()).unwrap();
    ex.extract().unwrap();

    assert!(readiness.wait_for_timeout("01.jpg", Duration::from_secs(10)));
    assert_eq!(ex.state(), State::Extracting);
    assert!(!readiness.is_finished());
    assert!(!readiness.is_ready("03.jpg"));
    assert_eq!(fs::read(readiness.path_of("01.jpg").unwrap()).unwrap(), b"one");

    ex.join();
    assert_eq!(ex.state(), State::Done);
    assert!(readiness.is_ready("03.jpg"));
}

#[test]
fn test_seven_zip_yields_between_batches() {
    let dir = tempdir().unwrap();
    let src = seven_zip_file(dir.path());
    let out = tempdir().unwrap();

    let options = ExtractOptions::default()
        .yield_every(1)
        .yield_pause(std::time::Duration::from_millis(1));
    let mut ex = Extractor::new(context(), Arc::new(Headless)).with_options(options);
    let readiness = ex.setup(&src, out.path()).unwrap();
    ex.set_files(["03.jpg", "01.jpg"]).unwrap();
    ex.extract().unwrap();
    ex.join();

    assert!(readiness.is_ready("01.jpg"));
    assert!(readiness.is_ready("03.jpg"));
    assert!(!readiness.is_ready("sub/02.jpg"));
}

#[test]
fn test_seven_zip_password_prompt() {
    let dir = tempdir().unwrap();
    let src = seven_zip_file(dir.path());
    let out = tempdir().unwrap();

    let ui = Arc::new(Recorder {
        password: Some("secret"),
        ..Recorder::default()
    });
    let locked = locked_context();
    let mut ex = Extractor::new(Arc::clone(&locked), ui.clone());
    ex.setup(&src, out.path()).unwrap();
    assert_eq!(ui.asked.load(Ordering::SeqCst), 1);
    assert_eq!(ex.get_files().len(), 3);
    assert_eq!(locked.last_password(), "secret");
}

#[test]
fn test_seven_zip_cancelled_prompt_fails_setup() {
    let dir = tempdir().unwrap();
    let src = seven_zip_file(dir.path());
    let out = tempdir().unwrap();

    let mut ex = Extractor::new(locked_context(), Arc::new(Headless));
    assert!(matches!(
        ex.setup(&src, out.path()),
        Err(Error::PasswordRequired { .. })
    ));
}

/// A 7z stand-in whose listing needs the password "secret".
fn locked_context() -> Arc<ArchiveContext> {
    Arc::new(ArchiveContext::new().with_candidates(ToolKind::SevenZip, [&TOOLS.locked_sevenzip]))
}

#[test]
fn test_rar_extracts_per_entry() {
    let dir = tempdir().unwrap();
    let src = rar_file(dir.path());
    let out = tempdir().unwrap();

    let mut ex = Extractor::new(context(), Arc::new(Headless));
    let readiness = ex.setup(&src, out.path()).unwrap();
    assert_eq!(ex.format(), Some(ArchiveFormat::Rar));
    assert_eq!(ex.get_files(), ["01.jpg", "broken.jpg"]);

    ex.extract().unwrap();
    ex.join();

    assert_eq!(fs::read(out.path().join("01.jpg")).unwrap(), b"page");
    assert!(readiness.is_ready("broken.jpg"));
    assert_eq!(readiness.path_of("broken.jpg"), None);
}

#[test]
fn test_rar_password_prompt() {
    let dir = tempdir().unwrap();
    let src = rar_file(dir.path());
    let out = tempdir().unwrap();

    let ctx = Arc::new(
        ArchiveContext::new().with_candidates(ToolKind::Rar, [&TOOLS.locked_unrar]),
    );
    let ui = Arc::new(Recorder {
        password: Some("secret"),
        ..Recorder::default()
    });
    let mut ex = Extractor::new(Arc::clone(&ctx), ui.clone());
    let readiness = ex.setup(&src, out.path()).unwrap();
    assert_eq!(ui.asked.load(Ordering::SeqCst), 1);
    assert_eq!(ex.get_files(), ["01.jpg", "broken.jpg"]);
    assert_eq!(ctx.last_password(), "secret");

    ex.set_files(["01.jpg"]).unwrap();
    ex.extract().unwrap();
    ex.join();
    assert_eq!(fs::read(readiness.path_of("01.jpg").unwrap()).unwrap(), b"page");
}

#[test]
fn test_rar_without_password_lists_nothing() {
    let dir = tempdir().unwrap();
    let src = rar_file(dir.path());
    let out = tempdir().unwrap();

    let ctx = Arc::new(
        ArchiveContext::new().with_candidates(ToolKind::Rar, [&TOOLS.locked_unrar]),
    );
    let ui = Arc::new(Recorder::default());
    let mut ex = Extractor::new(ctx, ui.clone());
    ex.setup(&src, out.path()).unwrap();
    assert_eq!(ui.asked.load(Ordering::SeqCst), 1);
    assert!(ex.get_files().is_empty());
}

#[test]
fn test_missing_tool_notifies() {
    let dir = tempdir().unwrap();
    let src = rar_file(dir.path());
    let out = tempdir().unwrap();

    let ctx = Arc::new(
        ArchiveContext::new().with_candidates(ToolKind::Rar, ["nonexistent_binary_12345"]),
    );
    let ui = Arc::new(Recorder::default());
    let mut ex = Extractor::new(ctx, ui.clone());

    assert!(matches!(
        ex.setup(&src, out.path()),
        Err(Error::MissingTool { kind: ToolKind::Rar, .. })
    ));
    assert_eq!(ui.missing.load(Ordering::SeqCst), 1);
}
