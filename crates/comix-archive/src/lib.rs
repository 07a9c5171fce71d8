//! Progressive comic archive extraction and re-packing.
//!
//! # Architecture
//!
//! - `detect.rs` - Format detection by content
//! - `sanitize.rs` - Path containment and entry name fixes
//! - `driver/` - Command lines and output parsers for external extractors
//! - `source/` - Per-format readers behind `ArchiveSource`
//! - `signal.rs` - Per-entry readiness and cancellation
//! - `extractor.rs` - Background extraction lifecycle
//! - `packer.rs` - Writing comic zips
//! - `info.rs` - Archive summaries

pub use context::{ArchiveContext, Headless, Interaction};
pub use detect::classify;
pub use driver::{Tool, ToolKind};
pub use error::{Error, Result};
pub use extractor::{Extractor, State};
pub use format::{ArchiveFormat, TarCompress};
pub use info::{ArchiveInfo, is_image_name};
pub use options::ExtractOptions;
pub use packer::{PackRequest, Packer};
pub use signal::{Readiness, StopFlag};
pub use source::{ArchiveHandle, ArchiveSource};

pub mod context;
pub mod detect;
pub mod driver;
mod error;
pub mod extractor;
pub mod format;
pub mod info;
pub mod options;
pub mod packer;
pub mod sanitize;
pub mod signal;
pub mod source;
