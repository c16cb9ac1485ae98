//! Asynchronous signals turned into a readable descriptor.
//!
//! Handlers only set a flag and write a wake byte to a non-blocking pipe. The
//! relay polls the read end next to its other descriptors and does all real
//! work, reaping included, outside signal context.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use libc::c_int;
use nix::sys::signal::Signal;
use signal_hook::consts::signal::{SIGCHLD, SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGWINCH};
use signal_hook::SigId;

use crate::plumbing;

/// Signals delivered to the wrapper that are passed on to the child.
const FORWARDED: [c_int; 4] = [SIGINT, SIGQUIT, SIGTERM, SIGHUP];

pub struct SessionSignals {
    wake: File,
    child_exit: Arc<AtomicBool>,
    resize: Arc<AtomicBool>,
    forwarded: Vec<(c_int, Arc<AtomicBool>)>,
    ids: Vec<SigId>,
}

impl SessionSignals {
    /// Registers handlers for child state changes, window resizes, and the
    /// forwarded termination signals. Must happen before the child is forked
    /// so an early exit is never missed.
    pub fn install() -> io::Result<Self> {
        let (wake, notify) = plumbing::nonblocking_pipe()?;
        let mut signals = Self {
            wake,
            child_exit: Arc::new(AtomicBool::new(false)),
            resize: Arc::new(AtomicBool::new(false)),
            forwarded: Vec::new(),
            ids: Vec::new(),
        };

        signals.watch(SIGCHLD, Arc::clone(&signals.child_exit), &notify)?;
        signals.watch(SIGWINCH, Arc::clone(&signals.resize), &notify)?;
        for signal in FORWARDED {
            let flag = Arc::new(AtomicBool::new(false));
            signals.watch(signal, Arc::clone(&flag), &notify)?;
            signals.forwarded.push((signal, flag));
        }
        Ok(signals)
    }

    fn watch(&mut self, signal: c_int, flag: Arc<AtomicBool>, notify: &File) -> io::Result<()> {
        // Flag first: by the time the wake byte is readable the flag is set.
        self.ids.push(signal_hook::flag::register(signal, flag)?);
        self.ids
            .push(signal_hook::low_level::pipe::register(signal, notify.try_clone()?)?);
        Ok(())
    }

    /// Empties the wake pipe.
    pub fn clear_wake(&self) -> io::Result<()> {
        let mut buf = [0u8; 64];
        let mut wake = &self.wake;
        loop {
            match wake.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(_) => continue,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// True once per burst of SIGCHLD deliveries.
    pub fn take_child_exit(&self) -> bool {
        self.child_exit.swap(false, Ordering::SeqCst)
    }

    pub fn take_resize(&self) -> bool {
        self.resize.swap(false, Ordering::SeqCst)
    }

    /// Forwardable signals received since the last call.
    pub fn take_forwarded(&self) -> Vec<Signal> {
        self.forwarded
            .iter()
            .filter(|(_, flag)| flag.swap(false, Ordering::SeqCst))
            .filter_map(|(signal, _)| Signal::try_from(*signal).ok())
            .collect()
    }
}

impl AsFd for SessionSignals {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.wake.as_fd()
    }
}

impl Drop for SessionSignals {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}
