use thiserror::Error;

use crate::child::ChildError;
use crate::editor::EditorError;
use crate::plumbing::PlumbingError;
use crate::relay::RelayError;
use crate::terminal::TerminalError;

/// Exit code for failures inside the wrapper itself.
pub const FAILURE_EXIT_CODE: u8 = 1;

/// Any error that ends a wrapper run.
#[derive(Debug, Error)]
pub enum WrapError {
    #[error(transparent)]
    Plumbing(#[from] PlumbingError),

    #[error(transparent)]
    Terminal(#[from] TerminalError),

    #[error(transparent)]
    Child(#[from] ChildError),

    #[error(transparent)]
    Editor(#[from] EditorError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl WrapError {
    /// Internal failures never mirror a child status.
    pub fn exit_code(&self) -> u8 {
        FAILURE_EXIT_CODE
    }
}

pub type Result<T> = std::result::Result<T, WrapError>;
