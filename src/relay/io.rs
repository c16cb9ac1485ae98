use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

/// Result of one non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    Data(usize),
    /// Nothing more available right now.
    Exhausted,
    Closed,
}

/// Reads once, retrying only on `EINTR`.
pub(crate) fn read_nonblocking(mut source: &File, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    loop {
        match source.read(buf) {
            Ok(0) => return Ok(ReadOutcome::Closed),
            Ok(n) => return Ok(ReadOutcome::Data(n)),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                return Ok(ReadOutcome::Exhausted)
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Writer over a possibly non-blocking descriptor that never reports
/// `WouldBlock`: it parks in `poll` until the descriptor drains instead.
///
/// Combined with `write_all`, every write is complete before the call returns.
pub(crate) struct FlushingWriter<'a> {
    file: &'a File,
}

impl<'a> FlushingWriter<'a> {
    pub(crate) fn new(file: &'a File) -> Self {
        Self { file }
    }
}

impl Write for FlushingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match (&*self.file).write(buf) {
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    wait_writable(self.file.as_fd())?
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn wait_writable(fd: BorrowedFd<'_>) -> io::Result<()> {
    let mut fds = [PollFd::new(fd, PollFlags::POLLOUT)];
    match poll(&mut fds, PollTimeout::NONE) {
        Ok(_) | Err(Errno::EINTR) => Ok(()),
        Err(errno) => Err(errno.into()),
    }
}
