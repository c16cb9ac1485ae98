//! Keystroke-level line editing.
//!
//! [`LineEditor`] consumes raw terminal bytes one at a time. Printable bytes
//! are appended and echoed, the erase character removes the last byte, other
//! control bytes are dropped, and a line terminator sends the whole line plus
//! `\n` to the child in one write.

mod buffer;
mod history;

pub use buffer::InputLineBuffer;
pub use history::HistoryList;

use std::io::{self, Write};

use thiserror::Error;

use crate::terminal::screen;

/// Errors raised while editing or submitting a line.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("input line capacity overflow at {current} bytes")]
    CapacityOverflow { current: usize },

    #[error("failed to allocate {requested} bytes for the input line")]
    Allocation { requested: usize },

    #[error("failed to echo input: {0}")]
    Echo(#[source] io::Error),

    #[error("failed to send line to child: {0}")]
    Submit(#[source] io::Error),
}

/// Terminal characters that end or edit a line.
///
/// A literal `\n` always submits. `end_of_line` is an additional, separately
/// configured submit character. `None` disables a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineTriggers {
    pub erase: Option<u8>,
    pub end_of_line: Option<u8>,
}

impl LineTriggers {
    /// Builds triggers from termios control characters. A value of `0`
    /// (`_POSIX_VDISABLE`) means the character is disabled.
    pub fn from_control_chars(erase: u8, end_of_line: u8) -> Self {
        let enabled = |c: u8| (c != 0).then_some(c);
        Self {
            erase: enabled(erase),
            end_of_line: enabled(end_of_line),
        }
    }

    fn is_terminator(&self, byte: u8) -> bool {
        byte == b'\n' || self.end_of_line == Some(byte)
    }
}

impl Default for LineTriggers {
    fn default() -> Self {
        Self {
            erase: Some(0x7f),
            end_of_line: None,
        }
    }
}

/// What a single keystroke did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Inserted,
    Erased,
    Ignored,
    Submitted,
}

pub struct LineEditor {
    line: InputLineBuffer,
    history: HistoryList,
    triggers: LineTriggers,
    checkpoints: bool,
}

impl LineEditor {
    pub fn new(triggers: LineTriggers) -> Self {
        Self {
            line: InputLineBuffer::new(),
            history: HistoryList::new(),
            triggers,
            checkpoints: true,
        }
    }

    /// Whether a submitted line is followed by a cursor checkpoint. Only the
    /// pipe topology brackets output; a pty child owns the cursor.
    pub fn set_checkpoints(&mut self, enabled: bool) {
        self.checkpoints = enabled;
    }

    /// The not-yet-submitted line. Never contains the terminator.
    pub fn line(&self) -> &[u8] {
        self.line.as_bytes()
    }

    pub fn buffer(&self) -> &InputLineBuffer {
        &self.line
    }

    pub fn history(&self) -> &HistoryList {
        &self.history
    }

    pub fn triggers(&self) -> LineTriggers {
        self.triggers
    }

    /// Applies one keystroke. Echo goes to `echo`, submitted lines to `child`.
    pub fn feed<E, C>(
        &mut self,
        byte: u8,
        echo: &mut E,
        child: &mut C,
    ) -> Result<KeyOutcome, EditorError>
    where
        E: Write,
        C: Write,
    {
        if self.triggers.is_terminator(byte) {
            return self.submit(echo, child);
        }
        if self.triggers.erase == Some(byte) {
            return self.erase(echo);
        }
        if is_control(byte) {
            return Ok(KeyOutcome::Ignored);
        }

        self.line.push(byte)?;
        echo.write_all(&[byte]).map_err(EditorError::Echo)?;
        Ok(KeyOutcome::Inserted)
    }

    fn erase<E: Write>(&mut self, echo: &mut E) -> Result<KeyOutcome, EditorError> {
        if self.line.pop().is_none() {
            return Ok(KeyOutcome::Ignored);
        }
        echo.write_all(screen::ERASE_COLUMN).map_err(EditorError::Echo)?;
        Ok(KeyOutcome::Erased)
    }

    fn submit<E, C>(&mut self, echo: &mut E, child: &mut C) -> Result<KeyOutcome, EditorError>
    where
        E: Write,
        C: Write,
    {
        let content_len = self.line.len();
        self.line.push(b'\n')?;
        let sent = child
            .write_all(self.line.as_bytes())
            .and_then(|()| child.flush());
        if let Err(err) = sent {
            self.line.pop();
            return Err(EditorError::Submit(err));
        }

        self.history.push(&self.line.as_bytes()[..content_len]);
        self.line.clear();

        echo.write_all(b"\n").map_err(EditorError::Echo)?;
        if self.checkpoints {
            screen::checkpoint(echo).map_err(EditorError::Echo)?;
        }
        Ok(KeyOutcome::Submitted)
    }
}

/// Bytes below space, plus DEL.
fn is_control(byte: u8) -> bool {
    byte < b' ' || byte == 0x7f
}
