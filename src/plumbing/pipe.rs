use std::os::fd::OwnedFd;

use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use tracing::debug;

use super::{ChannelPair, ChannelProvider, ChildStdio, PlumbingError, Topology};

/// Independent pipes: one for the child's stdin, one shared by stdout and stderr.
///
/// Used when the wrapper itself holds the real terminal; the child never sees
/// a terminal device.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipeProvider;

impl ChannelProvider for PipeProvider {
    fn topology(&self) -> Topology {
        Topology::Pipes
    }

    fn open(&self) -> Result<(ChannelPair, ChildStdio), PlumbingError> {
        let (stdin_read, stdin_write) = pipe()?;
        let (output_read, output_write) = pipe()?;

        let pair = ChannelPair::new(stdin_write, output_read, Topology::Pipes)?;
        debug!("opened pipe channels");
        Ok((
            pair,
            ChildStdio {
                stdin: stdin_read,
                output: output_write,
                controlling_terminal: false,
            },
        ))
    }
}

/// Both ends close-on-exec; the child's copies survive exec through `dup2`.
fn pipe() -> Result<(OwnedFd, OwnedFd), PlumbingError> {
    pipe2(OFlag::O_CLOEXEC).map_err(|errno| PlumbingError::Pipe(errno.into()))
}
