//! Descriptor topology between the wrapper and its child.
//!
//! A [`ChannelProvider`] allocates two halves at once:
//!
//! - [`ChannelPair`]: the outer ends kept by the wrapper, non-blocking and
//!   close-on-exec.
//! - [`ChildStdio`]: the inner ends that become the child's standard streams
//!   right before exec.
//!
//! Two providers exist: [`PipeProvider`] (independent pipes for stdin and the
//! combined stdout/stderr) and [`PtyProvider`] (one pseudo-terminal pair).
//! The relay and the line editor only ever see a [`ChannelPair`].

mod pipe;
mod pty;

pub use pipe::PipeProvider;
pub use pty::PtyProvider;

use std::fs::File;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::pty::Winsize;
use nix::unistd::pipe2;
use thiserror::Error;

/// Errors raised while allocating or adjusting channels.
#[derive(Debug, Error)]
pub enum PlumbingError {
    #[error("failed to create pipe: {0}")]
    Pipe(#[source] io::Error),

    #[error("failed to allocate pseudo-terminal: {0}")]
    Pty(#[source] nix::errno::Errno),

    #[error("failed to configure descriptor {fd}: {source}")]
    Configure {
        fd: RawFd,
        #[source]
        source: io::Error,
    },

    #[error("failed to duplicate descriptor: {0}")]
    Duplicate(#[source] io::Error),

    #[error("failed to resize pseudo-terminal: {0}")]
    Resize(#[source] io::Error),
}

/// Which kind of channel connects the wrapper to the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    /// Separate pipes for stdin and for stdout+stderr.
    #[default]
    Pipes,
    /// A pseudo-terminal; the slave becomes the child's controlling terminal.
    Pty,
}

/// Allocates the channels for one child.
pub trait ChannelProvider {
    fn topology(&self) -> Topology;

    fn open(&self) -> Result<(ChannelPair, ChildStdio), PlumbingError>;
}

/// Outer ends of the channels, owned by the wrapper.
pub struct ChannelPair {
    input: File,
    output: Option<File>,
    topology: Topology,
}

impl ChannelPair {
    pub(crate) fn new(
        input: OwnedFd,
        output: OwnedFd,
        topology: Topology,
    ) -> Result<Self, PlumbingError> {
        for fd in [input.as_fd(), output.as_fd()] {
            set_cloexec(fd).map_err(|source| configure_error(fd, source))?;
            set_nonblocking(fd).map_err(|source| configure_error(fd, source))?;
        }
        Ok(Self {
            input: File::from(input),
            output: Some(File::from(output)),
            topology,
        })
    }

    /// Write end of the child's input.
    pub fn input(&self) -> &File {
        &self.input
    }

    /// Read end of the child's output, `None` once end-of-stream was seen.
    pub fn output(&self) -> Option<&File> {
        self.output.as_ref()
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Stops reading the child's output and releases the descriptor.
    pub fn close_output(&mut self) {
        self.output = None;
    }

    /// Whether a read error on the output channel means the child side hung up.
    ///
    /// Linux reports a closed pty slave as `EIO` on the master instead of a
    /// zero-length read.
    pub fn is_hangup(&self, err: &io::Error) -> bool {
        self.topology == Topology::Pty && err.raw_os_error() == Some(libc::EIO)
    }

    /// Applies a window size to the pty. No-op for pipes.
    pub fn resize(&self, size: &Winsize) -> Result<(), PlumbingError> {
        if self.topology != Topology::Pty {
            return Ok(());
        }
        let ret = unsafe {
            libc::ioctl(
                self.input.as_raw_fd(),
                libc::TIOCSWINSZ as _,
                size as *const Winsize,
            )
        };
        if ret < 0 {
            return Err(PlumbingError::Resize(io::Error::last_os_error()));
        }
        Ok(())
    }
}

/// Inner ends handed to the child at exec time.
pub struct ChildStdio {
    stdin: OwnedFd,
    output: OwnedFd,
    controlling_terminal: bool,
}

impl ChildStdio {
    /// Raw descriptors for stdin and for stdout/stderr.
    pub(crate) fn raw_fds(&self) -> (RawFd, RawFd) {
        (self.stdin.as_raw_fd(), self.output.as_raw_fd())
    }

    /// True when stdin is a pty slave that must become the controlling terminal.
    pub fn controlling_terminal(&self) -> bool {
        self.controlling_terminal
    }
}

/// A close-on-exec pipe with both ends in blocking mode.
///
/// The flag is set atomically so a concurrent fork never inherits either end.
pub fn cloexec_pipe() -> io::Result<(File, File)> {
    let (read, write) = pipe2(OFlag::O_CLOEXEC).map_err(io::Error::from)?;
    Ok((File::from(read), File::from(write)))
}

/// A close-on-exec pipe with both ends non-blocking.
pub fn nonblocking_pipe() -> io::Result<(File, File)> {
    let (read, write) = cloexec_pipe()?;
    set_nonblocking(read.as_fd())?;
    set_nonblocking(write.as_fd())?;
    Ok((read, write))
}

pub(crate) fn set_cloexec(fd: BorrowedFd<'_>) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = FdFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFD)?);
    fcntl(raw, FcntlArg::F_SETFD(flags | FdFlag::FD_CLOEXEC))?;
    Ok(())
}

pub(crate) fn set_nonblocking(fd: BorrowedFd<'_>) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

fn configure_error(fd: BorrowedFd<'_>, source: io::Error) -> PlumbingError {
    PlumbingError::Configure {
        fd: fd.as_raw_fd(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(fd: BorrowedFd<'_>) -> (FdFlag, OFlag) {
        let raw = fd.as_raw_fd();
        (
            FdFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFD).unwrap()),
            OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL).unwrap()),
        )
    }

    #[test]
    fn cloexec_pipe_stays_blocking() {
        let (read, write) = cloexec_pipe().unwrap();
        for fd in [read.as_fd(), write.as_fd()] {
            let (fd_flags, status) = flags(fd);
            assert!(fd_flags.contains(FdFlag::FD_CLOEXEC));
            assert!(!status.contains(OFlag::O_NONBLOCK));
        }
    }

    #[test]
    fn nonblocking_pipe_sets_both_flags() {
        let (read, write) = nonblocking_pipe().unwrap();
        for fd in [read.as_fd(), write.as_fd()] {
            let (fd_flags, status) = flags(fd);
            assert!(fd_flags.contains(FdFlag::FD_CLOEXEC));
            assert!(status.contains(OFlag::O_NONBLOCK));
        }
    }

    #[test]
    fn hangup_only_applies_to_pty() {
        let pair = PipeProvider.open().unwrap().0;
        let eio = io::Error::from_raw_os_error(libc::EIO);
        assert!(!pair.is_hangup(&eio));

        let pair = PtyProvider::new(None, None).open().unwrap().0;
        assert!(pair.is_hangup(&eio));
        assert!(!pair.is_hangup(&io::Error::from_raw_os_error(libc::EBADF)));
    }

    #[test]
    fn close_output_is_final() {
        let mut pair = PipeProvider.open().unwrap().0;
        assert!(pair.output().is_some());
        pair.close_output();
        assert!(pair.output().is_none());
        pair.close_output();
        assert!(pair.output().is_none());
    }
}
