use std::io;
use std::path::PathBuf;

use crate::driver::ToolKind;
use crate::extractor::State;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported archive format: '{path}'")]
    UnsupportedFormat { path: PathBuf },

    #[error("cannot access '{path}': {source}")]
    Inaccessible { path: PathBuf, source: io::Error },

    #[error("no {kind} extractor found (tried {tried})")]
    MissingTool { kind: ToolKind, tried: String },

    #[error("'{path}' is encrypted and no password was supplied")]
    PasswordRequired { path: PathBuf },

    #[error("entry '{entry}' resolves outside the destination: '{resolved}'")]
    TraversalRejected { entry: PathBuf, resolved: PathBuf },

    #[error("entry not found in archive: '{0}'")]
    EntryNotFound(String),

    #[error("entry '{entry}' was not produced by the extractor")]
    NotMaterialized { entry: String },

    #[error("failed to extract '{path}': {source}")]
    ExtractionFailed { path: PathBuf, source: io::Error },

    #[error("failed to create directory: {path}: {source}")]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    #[error("{tool} exited with {status}")]
    ToolFailed { tool: String, status: std::process::ExitStatus },

    #[error("{tool} does not support this operation")]
    UnsupportedOperation { tool: ToolKind },

    #[error("failed to create archive '{path}': {source}")]
    PackCreate { path: PathBuf, source: io::Error },

    #[error("failed to add '{path}' to archive: {source}")]
    PackWrite { path: PathBuf, source: io::Error },

    #[error("operation not allowed in state {actual:?}, requires {expected:?}")]
    InvalidState { expected: State, actual: State },

    #[error("archive handle is closed")]
    Closed,

    #[error(transparent)]
    Platform(#[from] comix_platform::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
