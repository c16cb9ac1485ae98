//! The single control loop.
//!
//! One `poll` covers the child's output, the terminal's input, and the signal
//! wake pipe. Per wake, in order:
//!
//! 1. child output is drained to `EAGAIN` and printed above the input line,
//! 2. terminal input is drained and fed to the [`LineEditor`],
//! 3. pending signals are handled: forwarded, resized, or the child reaped.
//!
//! Every write is flushed before the next `poll`. The loop ends only when the
//! child has been reaped; closing either stream does not end it.
//!
//! With pipes, output is printed above the input line using cursor
//! save/restore. A pty child owns the cursor, so its output is copied verbatim.

mod io;

use std::fs::File;
use std::io::Write;
use std::os::fd::AsFd;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use thiserror::Error;
use tracing::{debug, info};

use crate::child::{ChildError, ChildSupervisor, ExitResult, SessionSignals};
use crate::editor::{EditorError, LineEditor};
use crate::plumbing::{self, ChannelPair, PlumbingError, Topology};
use crate::terminal::{self, screen};
use io::{read_nonblocking, FlushingWriter, ReadOutcome};

/// Errors that end the relay loop early. All of them are fatal.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to wait for readiness: {0}")]
    Poll(#[source] Errno),

    #[error("failed to read child output: {0}")]
    ReadOutput(#[source] std::io::Error),

    #[error("failed to read terminal input: {0}")]
    ReadTerminal(#[source] std::io::Error),

    #[error("failed to write to terminal: {0}")]
    WriteTerminal(#[source] std::io::Error),

    #[error("failed to read signal notifications: {0}")]
    Signals(#[source] std::io::Error),

    #[error(transparent)]
    Editor(#[from] EditorError),

    #[error(transparent)]
    Child(#[from] ChildError),

    #[error(transparent)]
    Plumbing(#[from] PlumbingError),
}

/// The two directions of the real terminal as seen by the relay.
///
/// For an interactive session both are handles on the same device; tests use
/// plain pipes.
pub struct TerminalIo {
    input: File,
    output: File,
}

impl TerminalIo {
    /// Puts `input` in non-blocking mode so it can be drained.
    pub fn new(input: File, output: File) -> std::io::Result<Self> {
        plumbing::set_nonblocking(input.as_fd())?;
        Ok(Self { input, output })
    }
}

const OUTPUT_EVENTS: PollFlags = PollFlags::POLLIN
    .union(PollFlags::POLLHUP)
    .union(PollFlags::POLLERR);

/// Readiness observed in one wake.
#[derive(Debug, Default)]
struct Wake {
    output: bool,
    input: bool,
    signals: bool,
}

pub struct Relay<'s> {
    terminal: TerminalIo,
    channels: ChannelPair,
    signals: &'s SessionSignals,
    editor: LineEditor,
    chunk: Vec<u8>,
    terminal_open: bool,
    bracketing: bool,
}

impl<'s> Relay<'s> {
    pub fn new(
        terminal: TerminalIo,
        channels: ChannelPair,
        signals: &'s SessionSignals,
        mut editor: LineEditor,
        read_chunk: usize,
    ) -> Self {
        let bracketing = channels.topology() == Topology::Pipes;
        editor.set_checkpoints(bracketing);
        Self {
            terminal,
            channels,
            signals,
            editor,
            chunk: vec![0; read_chunk.max(1)],
            terminal_open: true,
            bracketing,
        }
    }

    pub fn editor(&self) -> &LineEditor {
        &self.editor
    }

    /// Runs until `child` is reaped and returns how it ended.
    pub fn run(&mut self, child: &mut ChildSupervisor) -> Result<ExitResult, RelayError> {
        if self.bracketing {
            let mut out = FlushingWriter::new(&self.terminal.output);
            screen::checkpoint(&mut out).map_err(RelayError::WriteTerminal)?;
        }

        loop {
            let wake = self.wait()?;
            if wake.output {
                self.relay_output()?;
            }
            if wake.input {
                self.relay_input()?;
            }
            if wake.signals {
                if let Some(result) = self.handle_signals(child)? {
                    // Output written just before exit is still in the channel.
                    self.relay_output()?;
                    info!(%result, "relay finished");
                    return Ok(result);
                }
            }
        }
    }

    fn wait(&self) -> Result<Wake, RelayError> {
        let mut fds = vec![PollFd::new(self.signals.as_fd(), PollFlags::POLLIN)];
        let output_slot = self.channels.output().map(|output| {
            fds.push(PollFd::new(output.as_fd(), PollFlags::POLLIN));
            fds.len() - 1
        });
        let input_slot = self.terminal_open.then(|| {
            fds.push(PollFd::new(self.terminal.input.as_fd(), PollFlags::POLLIN));
            fds.len() - 1
        });

        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(Wake::default()),
            Err(errno) => return Err(RelayError::Poll(errno)),
        }

        let ready = |slot: Option<usize>| {
            slot.and_then(|i| fds[i].revents())
                .is_some_and(|events| events.intersects(OUTPUT_EVENTS))
        };
        Ok(Wake {
            signals: ready(Some(0)),
            output: ready(output_slot),
            input: ready(input_slot),
        })
    }

    /// Drains the child's output to the terminal, moving the input line below it.
    fn relay_output(&mut self) -> Result<(), RelayError> {
        let Some(output) = self.channels.output() else {
            return Ok(());
        };
        let mut out = FlushingWriter::new(&self.terminal.output);
        let mut printed = false;
        let mut closed = false;

        loop {
            match read_nonblocking(output, &mut self.chunk) {
                Ok(ReadOutcome::Data(n)) => {
                    if !printed && self.bracketing {
                        screen::erase_pending(&mut out).map_err(RelayError::WriteTerminal)?;
                    }
                    printed = true;
                    out.write_all(&self.chunk[..n])
                        .map_err(RelayError::WriteTerminal)?;
                }
                Ok(ReadOutcome::Exhausted) => break,
                Ok(ReadOutcome::Closed) => {
                    closed = true;
                    break;
                }
                Err(err) if self.channels.is_hangup(&err) => {
                    closed = true;
                    break;
                }
                Err(err) => return Err(RelayError::ReadOutput(err)),
            }
        }

        if printed && self.bracketing {
            screen::repaint(&mut out, self.editor.line()).map_err(RelayError::WriteTerminal)?;
        }
        if closed {
            debug!("child output reached end of stream");
            self.channels.close_output();
        }
        Ok(())
    }

    /// Feeds every available keystroke to the line editor.
    fn relay_input(&mut self) -> Result<(), RelayError> {
        let mut echo = FlushingWriter::new(&self.terminal.output);
        let mut child = FlushingWriter::new(self.channels.input());

        loop {
            match read_nonblocking(&self.terminal.input, &mut self.chunk) {
                Ok(ReadOutcome::Data(n)) => {
                    for &byte in &self.chunk[..n] {
                        self.editor.feed(byte, &mut echo, &mut child)?;
                    }
                }
                Ok(ReadOutcome::Exhausted) => return Ok(()),
                Ok(ReadOutcome::Closed) => {
                    debug!("terminal input reached end of stream");
                    self.terminal_open = false;
                    return Ok(());
                }
                Err(err) => return Err(RelayError::ReadTerminal(err)),
            }
        }
    }

    /// Returns the exit result once the child has been reaped.
    fn handle_signals(
        &mut self,
        child: &mut ChildSupervisor,
    ) -> Result<Option<ExitResult>, RelayError> {
        self.signals.clear_wake().map_err(RelayError::Signals)?;

        for signal in self.signals.take_forwarded() {
            info!(%signal, "forwarding signal to child");
            child.signal(signal)?;
        }
        if self.signals.take_resize() {
            if let Some(size) = terminal::window_size(self.terminal.output.as_fd()) {
                debug!(rows = size.ws_row, cols = size.ws_col, "propagating window size");
                self.channels.resize(&size)?;
            }
        }
        if self.signals.take_child_exit() {
            return Ok(child.try_wait()?);
        }
        Ok(None)
    }
}
