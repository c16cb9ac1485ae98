//! Lifecycle of the single supervised child.
//!
//! ```text
//! NotStarted --spawn--> Running(pid) --reap--> Reaped(result)
//! ```
//!
//! There is no way back to `Running`. A supervisor dropped while its child is
//! still running sends the child SIGTERM first.

mod command;
mod exit;
mod signals;

pub use command::{ChildCommand, DEFAULT_ENV};
pub use exit::ExitResult;
pub use signals::SessionSignals;

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};

use libc::{c_char, c_int};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::plumbing::{self, ChildStdio};
use command::ExecPlan;

/// Exit status of a child whose exec failed.
const EXEC_FAILED_STATUS: c_int = 127;

/// Errors raised while starting, signalling, or reaping the child.
#[derive(Debug, Error)]
pub enum ChildError {
    #[error("a child has already been spawned by this supervisor")]
    AlreadySpawned,

    #[error("no child has been spawned")]
    NotStarted,

    #[error("argument contains an interior NUL byte: {arg:?}")]
    InvalidArgument { arg: String },

    #[error("failed to create exec status pipe: {0}")]
    StatusPipe(#[source] io::Error),

    #[error("failed to fork: {0}")]
    Fork(#[source] Errno),

    #[error("failed to execute '{program}': {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for child {pid}: {source}")]
    Wait {
        pid: Pid,
        #[source]
        source: Errno,
    },

    /// The child changed state in a way that is neither exit nor death by signal.
    #[error("unexpected child state change: {0}")]
    UnexpectedStatus(String),

    #[error("failed to send {signal} to child {pid}: {source}")]
    Signal {
        pid: Pid,
        signal: Signal,
        #[source]
        source: Errno,
    },

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    NotStarted,
    Running(Pid),
    Reaped(ExitResult),
}

/// Forks, execs, and reaps exactly one child.
pub struct ChildSupervisor {
    state: ChildState,
}

impl ChildSupervisor {
    pub fn new() -> Self {
        Self {
            state: ChildState::NotStarted,
        }
    }

    pub fn state(&self) -> ChildState {
        self.state
    }

    pub fn pid(&self) -> Option<Pid> {
        match self.state {
            ChildState::Running(pid) => Some(pid),
            _ => None,
        }
    }

    pub fn is_alive(&self) -> bool {
        matches!(self.state, ChildState::Running(_))
    }

    /// Forks once and execs `command` with `stdio` as its standard streams.
    ///
    /// The child runs in a new session. An exec failure is reported back over
    /// a close-on-exec pipe; the failed child is reaped and `Exec` returned.
    pub fn spawn(
        &mut self,
        command: &ChildCommand,
        stdio: ChildStdio,
    ) -> Result<Pid, ChildError> {
        if self.state != ChildState::NotStarted {
            return Err(ChildError::AlreadySpawned);
        }
        let plan = command.exec_plan()?;
        let argv = plan.argv_ptrs();
        let (status_read, status_write) =
            plumbing::cloexec_pipe().map_err(ChildError::StatusPipe)?;

        match unsafe { fork() }.map_err(ChildError::Fork)? {
            ForkResult::Child => exec_child(&plan, &argv, &stdio, status_write.as_raw_fd()),
            ForkResult::Parent { child } => {
                drop(status_write);
                drop(stdio);
                self.state = ChildState::Running(child);
                info!(pid = child.as_raw(), program = ?command.program(), "spawned child");

                match read_exec_errno(status_read) {
                    Ok(None) => Ok(child),
                    Ok(Some(errno)) => {
                        let result = self.wait()?;
                        debug!(%result, "child failed to exec");
                        Err(ChildError::Exec {
                            program: command.program().to_string_lossy().into_owned(),
                            source: io::Error::from_raw_os_error(errno),
                        })
                    }
                    Err(err) => Err(ChildError::StatusPipe(err)),
                }
            }
        }
    }

    /// Reaps the child if it has terminated, without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitResult>, ChildError> {
        let pid = match self.state {
            ChildState::NotStarted => return Err(ChildError::NotStarted),
            ChildState::Reaped(result) => return Ok(Some(result)),
            ChildState::Running(pid) => pid,
        };
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => Ok(None),
            Ok(status) => self.record(status).map(Some),
            Err(Errno::EINTR) => Ok(None),
            Err(source) => Err(ChildError::Wait { pid, source }),
        }
    }

    /// Blocks until the child terminates.
    pub fn wait(&mut self) -> Result<ExitResult, ChildError> {
        let pid = match self.state {
            ChildState::NotStarted => return Err(ChildError::NotStarted),
            ChildState::Reaped(result) => return Ok(result),
            ChildState::Running(pid) => pid,
        };
        loop {
            match waitpid(pid, None) {
                Ok(status) => return self.record(status),
                Err(Errno::EINTR) => continue,
                Err(source) => return Err(ChildError::Wait { pid, source }),
            }
        }
    }

    /// Sends `signal` to a running child. A child that already exited is not
    /// an error.
    pub fn signal(&self, signal: Signal) -> Result<(), ChildError> {
        let Some(pid) = self.pid() else {
            return Ok(());
        };
        match signal::kill(pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => {
                debug!(pid = pid.as_raw(), %signal, "signalled child");
                Ok(())
            }
            Err(source) => Err(ChildError::Signal {
                pid,
                signal,
                source,
            }),
        }
    }

    /// Asks a running child to terminate.
    pub fn request_termination(&self) -> Result<(), ChildError> {
        self.signal(Signal::SIGTERM)
    }

    fn record(&mut self, status: WaitStatus) -> Result<ExitResult, ChildError> {
        let result = ExitResult::from_wait_status(status)
            .ok_or_else(|| ChildError::UnexpectedStatus(format!("{:?}", status)))?;
        self.state = ChildState::Reaped(result);
        info!(%result, "child reaped");
        Ok(result)
    }
}

impl Default for ChildSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChildSupervisor {
    fn drop(&mut self) {
        if let Some(pid) = self.pid() {
            warn!(pid = pid.as_raw(), "terminating child still running at teardown");
            let _ = self.request_termination();
        }
    }
}

/// Child side of the fork. Only async-signal-safe calls from here on.
fn exec_child(plan: &ExecPlan, argv: &[*const c_char], stdio: &ChildStdio, status: RawFd) -> ! {
    let (stdin, output) = stdio.raw_fds();
    unsafe {
        libc::setsid();
        if libc::dup2(stdin, libc::STDIN_FILENO) < 0
            || libc::dup2(output, libc::STDOUT_FILENO) < 0
            || libc::dup2(output, libc::STDERR_FILENO) < 0
        {
            report_exec_failure(status);
        }
        if stdio.controlling_terminal()
            && libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY as _, 0) < 0
        {
            report_exec_failure(status);
        }
        // The Rust runtime ignores SIGPIPE; programs expect the default.
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);

        if plan.search_path() {
            libc::execvp(plan.path().as_ptr(), argv.as_ptr());
        } else {
            libc::execv(plan.path().as_ptr(), argv.as_ptr());
        }
        report_exec_failure(status)
    }
}

unsafe fn report_exec_failure(status: RawFd) -> ! {
    let errno = Errno::last_raw().to_ne_bytes();
    libc::write(status, errno.as_ptr().cast(), errno.len());
    libc::_exit(EXEC_FAILED_STATUS)
}

/// `None` when the pipe closed on a successful exec, otherwise the child's errno.
fn read_exec_errno(mut pipe: File) -> io::Result<Option<i32>> {
    let mut bytes = [0u8; 4];
    let mut filled = 0;
    while filled < bytes.len() {
        match pipe.read(&mut bytes[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    match filled {
        0 => Ok(None),
        4 => Ok(Some(i32::from_ne_bytes(bytes))),
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated exec status",
        )),
    }
}
