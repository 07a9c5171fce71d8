//! Process plumbing shared by the archive layer.
//!
//! - `command.rs` - `Command` builder with streamed stdout lines
//! - `probe.rs` - executable resolution over a candidate list

pub use command::{Command, LineReader};
pub use error::{Error, Result};
pub use probe::probe;

pub mod command;
mod error;
mod probe;
