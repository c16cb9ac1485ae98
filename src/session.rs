//! The explicit context for one wrapper run.
//!
//! A [`Session`] owns the signal event source, the real terminal, and the
//! child supervisor, and wires them into a [`Relay`]. Field order is drop
//! order: a child still alive on teardown is sent SIGTERM before the terminal
//! is restored.

use tracing::{debug, info};

use crate::child::{ChildError, ChildSupervisor, ExitResult, SessionSignals};
use crate::config::WrapConfig;
use crate::editor::LineEditor;
use crate::error::Result;
use crate::plumbing::{ChannelProvider, PipeProvider, PtyProvider, Topology};
use crate::relay::{Relay, TerminalIo};
use crate::terminal::{TerminalController, TerminalError};

pub struct Session {
    child: ChildSupervisor,
    terminal: TerminalController,
    signals: SessionSignals,
    config: WrapConfig,
}

impl Session {
    /// Opens the configured terminal device and installs signal handling.
    pub fn new(config: WrapConfig) -> Result<Self> {
        let terminal = TerminalController::open(&config.tty_path)?;
        Self::with_terminal(config, terminal)
    }

    /// Uses an already opened terminal.
    pub fn with_terminal(config: WrapConfig, terminal: TerminalController) -> Result<Self> {
        let signals = SessionSignals::install().map_err(ChildError::Signals)?;
        Ok(Self {
            child: ChildSupervisor::new(),
            terminal,
            signals,
            config,
        })
    }

    pub fn child(&self) -> &ChildSupervisor {
        &self.child
    }

    /// Spawns the child and relays until it exits.
    ///
    /// Raw mode is held exactly while the child runs. On any error a live
    /// child is asked to terminate, then the terminal is restored.
    pub fn run(&mut self) -> Result<ExitResult> {
        let provider = self.provider()?;
        let (channels, stdio) = provider.open()?;
        let editor = LineEditor::new(self.terminal.line_triggers()?);
        let terminal_io = TerminalIo::new(
            self.terminal.try_clone_device()?,
            self.terminal.try_clone_device()?,
        )
        .map_err(TerminalError::Configure)?;

        let mut terminal = scopeguard::guard(&mut self.terminal, |terminal| {
            let _ = terminal.restore();
        });
        terminal.enter_raw_mode()?;

        let mut child = scopeguard::guard(&mut self.child, |child| {
            if child.is_alive() {
                debug!("terminating child after relay failure");
                let _ = child.request_termination();
            }
        });
        child.spawn(&self.config.command, stdio)?;

        let mut relay = Relay::new(
            terminal_io,
            channels,
            &self.signals,
            editor,
            self.config.read_chunk,
        );
        let result = relay.run(&mut **child)?;
        drop(relay);
        drop(child);

        scopeguard::ScopeGuard::into_inner(terminal).restore()?;
        info!(%result, code = result.code(), "session finished");
        Ok(result)
    }

    fn provider(&self) -> Result<Box<dyn ChannelProvider>> {
        let provider: Box<dyn ChannelProvider> = match self.config.topology {
            Topology::Pipes => Box::new(PipeProvider),
            Topology::Pty => Box::new(PtyProvider::new(
                Some(self.terminal.attributes()?),
                self.terminal.window_size(),
            )),
        };
        Ok(provider)
    }
}
