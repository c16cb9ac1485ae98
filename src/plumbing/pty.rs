use std::os::fd::AsFd;

use nix::pty::{openpty, OpenptyResult, Winsize};
use nix::sys::termios::{LocalFlags, Termios};
use tracing::debug;

use super::{
    configure_error, set_cloexec, ChannelPair, ChannelProvider, ChildStdio, PlumbingError,
    Topology,
};

/// A pseudo-terminal pair. The child gets the slave as stdin, stdout, stderr
/// and controlling terminal, so full-screen programs keep working.
pub struct PtyProvider {
    attributes: Option<Termios>,
    size: Option<Winsize>,
}

impl PtyProvider {
    /// `attributes` are the real terminal's settings; echo is switched off on
    /// the slave because the line editor does all echoing.
    pub fn new(attributes: Option<Termios>, size: Option<Winsize>) -> Self {
        let attributes = attributes.map(|mut termios| {
            termios.local_flags.remove(LocalFlags::ECHO);
            termios
        });
        Self { attributes, size }
    }
}

impl ChannelProvider for PtyProvider {
    fn topology(&self) -> Topology {
        Topology::Pty
    }

    fn open(&self) -> Result<(ChannelPair, ChildStdio), PlumbingError> {
        let OpenptyResult { master, slave } =
            openpty(self.size.as_ref(), self.attributes.as_ref()).map_err(PlumbingError::Pty)?;
        for fd in [master.as_fd(), slave.as_fd()] {
            set_cloexec(fd).map_err(|source| configure_error(fd, source))?;
        }

        let reader = master.try_clone().map_err(PlumbingError::Duplicate)?;
        let slave_output = slave.try_clone().map_err(PlumbingError::Duplicate)?;
        let pair = ChannelPair::new(master, reader, Topology::Pty)?;
        debug!(
            rows = ?self.size.map(|s| s.ws_row),
            cols = ?self.size.map(|s| s.ws_col),
            "opened pty channels"
        );
        Ok((
            pair,
            ChildStdio {
                stdin: slave,
                output: slave_output,
                controlling_terminal: true,
            },
        ))
    }
}
