use std::fmt;

use nix::sys::wait::WaitStatus;

/// How the child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitResult {
    Exited(i32),
    Signaled(i32),
}

impl ExitResult {
    /// Shell convention: the exit code itself, or 128 + signal number.
    pub fn code(self) -> i32 {
        match self {
            ExitResult::Exited(code) => code,
            ExitResult::Signaled(signal) => 128 + signal,
        }
    }

    /// The code as a process exit status byte.
    pub fn exit_status(self) -> u8 {
        u8::try_from(self.code()).unwrap_or(u8::MAX)
    }

    pub fn success(self) -> bool {
        self == ExitResult::Exited(0)
    }

    /// Terminal wait statuses map to a result; stop/continue and the like do not.
    pub(crate) fn from_wait_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(ExitResult::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(ExitResult::Signaled(signal as i32)),
            _ => None,
        }
    }
}

impl fmt::Display for ExitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitResult::Exited(code) => write!(f, "exited with code {}", code),
            ExitResult::Signaled(signal) => write!(f, "killed by signal {}", signal),
        }
    }
}
