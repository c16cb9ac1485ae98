//! Interactive line-editing wrapper.
//!
//! `wrap PROGRAM` runs PROGRAM as a child, puts the real terminal in raw mode,
//! and relays bytes both ways. Keystrokes go through a [`editor::LineEditor`]
//! so the child only ever receives complete lines, while its output is printed
//! above the line being typed.

pub mod child;
pub mod cli;
pub mod config;
pub mod editor;
pub mod error;
pub mod logging;
pub mod plumbing;
pub mod relay;
pub mod session;
pub mod terminal;

pub use child::{ChildCommand, ChildSupervisor, ExitResult};
pub use config::WrapConfig;
pub use error::WrapError;
pub use session::Session;
