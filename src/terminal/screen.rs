//! Cursor bracketing for the in-progress input line.
//!
//! The wrapper does not track the screen. It saves the cursor where the line
//! being typed starts, and before child output is printed it jumps back there
//! and clears everything below, so output lands above the line.

use std::io::{self, Write};

use crossterm::cursor::{RestorePosition, SavePosition};
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};

/// Visually removes one column to the left of the cursor.
pub const ERASE_COLUMN: &[u8] = b"\x08 \x08";

/// Records the current cursor position as the start of the input line.
pub fn checkpoint<W: Write>(out: &mut W) -> io::Result<()> {
    queue!(out, SavePosition)
}

/// Moves back to the checkpoint and clears the rest of the screen.
pub fn erase_pending<W: Write>(out: &mut W) -> io::Result<()> {
    queue!(out, RestorePosition, Clear(ClearType::FromCursorDown))
}

/// Records a fresh checkpoint and redraws the line after it.
pub fn repaint<W: Write>(out: &mut W, line: &[u8]) -> io::Result<()> {
    checkpoint(out)?;
    out.write_all(line)
}
