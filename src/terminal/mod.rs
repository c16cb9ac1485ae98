//! Ownership of the real terminal device.
//!
//! [`TerminalController`] opens the terminal, snapshots its attributes once,
//! switches it to non-canonical no-echo mode for the session, and restores it
//! on every exit path through a [`TerminalGuard`].

mod guard;
pub mod screen;

pub use guard::TerminalGuard;

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::pty::Winsize;
use nix::sys::termios::{self, LocalFlags, SetArg, SpecialCharacterIndices, Termios};
use thiserror::Error;
use tracing::{debug, info};

use crate::editor::LineTriggers;

/// Errors raised while acquiring or configuring the terminal.
#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("failed to open terminal '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read terminal attributes: {0}")]
    GetAttributes(#[source] nix::errno::Errno),

    #[error("failed to set terminal attributes: {0}")]
    SetAttributes(#[source] nix::errno::Errno),

    #[error("failed to duplicate terminal descriptor: {0}")]
    Duplicate(#[source] io::Error),

    #[error("failed to configure terminal descriptor: {0}")]
    Configure(#[source] io::Error),
}

pub struct TerminalController {
    device: File,
    snapshot: Option<Termios>,
    raw: bool,
    guard: TerminalGuard,
}

impl TerminalController {
    /// Opens the terminal device in non-blocking mode.
    ///
    /// The device gets its own open file description, so the non-blocking flag
    /// never leaks into the shell's stdin.
    pub fn open(path: &Path) -> Result<Self, TerminalError> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(path)
            .map_err(|source| TerminalError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "opened terminal");
        Ok(Self::from_device(device))
    }

    /// Wraps an already opened terminal device.
    pub fn from_device(device: File) -> Self {
        Self {
            device,
            snapshot: None,
            raw: false,
            guard: TerminalGuard::new(),
        }
    }

    /// Switches to non-canonical, no-echo mode.
    ///
    /// The original attributes are captured on the first call only. Signal
    /// generation and output processing stay as they were.
    pub fn enter_raw_mode(&mut self) -> Result<(), TerminalError> {
        if self.raw {
            return Ok(());
        }
        let original = match &self.snapshot {
            Some(snapshot) => snapshot.clone(),
            None => {
                let current =
                    termios::tcgetattr(&self.device).map_err(TerminalError::GetAttributes)?;
                self.snapshot = Some(current.clone());
                current
            }
        };

        let restore_fd = self.device.try_clone().map_err(TerminalError::Duplicate)?;
        let saved = original.clone();
        self.guard
            .arm(move || termios::tcsetattr(&restore_fd, SetArg::TCSANOW, &saved));

        termios::tcsetattr(&self.device, SetArg::TCSANOW, &raw_attributes(&original))
            .map_err(TerminalError::SetAttributes)?;
        self.raw = true;
        info!("terminal switched to raw mode");
        Ok(())
    }

    /// Puts the original attributes back. Safe to call any number of times.
    pub fn restore(&mut self) -> Result<(), TerminalError> {
        let was_armed = self.guard.is_armed();
        self.guard.restore().map_err(TerminalError::SetAttributes)?;
        if was_armed {
            info!("terminal attributes restored");
        }
        self.raw = false;
        Ok(())
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Attributes captured before raw mode was entered.
    pub fn snapshot(&self) -> Option<&Termios> {
        self.snapshot.as_ref()
    }

    /// The terminal's cooked-mode attributes: the snapshot if one was taken,
    /// the live settings otherwise.
    pub fn attributes(&self) -> Result<Termios, TerminalError> {
        match &self.snapshot {
            Some(snapshot) => Ok(snapshot.clone()),
            None => termios::tcgetattr(&self.device).map_err(TerminalError::GetAttributes),
        }
    }

    /// Erase and end-of-line characters configured on the terminal.
    pub fn line_triggers(&self) -> Result<LineTriggers, TerminalError> {
        let attributes = self.attributes()?;
        let chars = attributes.control_chars;
        Ok(LineTriggers::from_control_chars(
            chars[SpecialCharacterIndices::VERASE as usize],
            chars[SpecialCharacterIndices::VEOL as usize],
        ))
    }

    pub fn window_size(&self) -> Option<Winsize> {
        window_size(self.device.as_fd())
    }

    /// A second handle on the device for the relay.
    pub fn try_clone_device(&self) -> Result<File, TerminalError> {
        self.device.try_clone().map_err(TerminalError::Duplicate)
    }
}

impl AsFd for TerminalController {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.device.as_fd()
    }
}

/// Current window size of a terminal, `None` if it is not a terminal or
/// reports zero columns.
pub fn window_size(fd: BorrowedFd<'_>) -> Option<Winsize> {
    let mut size = Winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let ret = unsafe {
        libc::ioctl(
            fd.as_raw_fd(),
            libc::TIOCGWINSZ as _,
            &mut size as *mut Winsize,
        )
    };
    if ret < 0 || size.ws_col == 0 {
        return None;
    }
    Some(size)
}

fn raw_attributes(original: &Termios) -> Termios {
    let mut raw = original.clone();
    raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
    raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    raw
}
