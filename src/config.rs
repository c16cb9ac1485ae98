use std::ffi::OsString;
use std::path::PathBuf;

use crate::child::ChildCommand;
use crate::plumbing::Topology;

/// Environment variable naming the log file prefix.
pub const LOG_ENV: &str = "WRAP_LOG";

/// Device opened for the real terminal.
pub const DEFAULT_TTY: &str = "/dev/tty";

/// Bytes read per `read` call in the relay.
pub const DEFAULT_READ_CHUNK: usize = 64 * 1024;

/// Resolved runtime configuration for one wrapper run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapConfig {
    pub command: ChildCommand,
    pub topology: Topology,
    pub tty_path: PathBuf,
    pub read_chunk: usize,
    /// Log file prefix; logging is off when unset.
    pub log_file: Option<PathBuf>,
}

impl WrapConfig {
    pub fn new(command: ChildCommand) -> Self {
        Self {
            command,
            topology: Topology::default(),
            tty_path: PathBuf::from(DEFAULT_TTY),
            read_chunk: DEFAULT_READ_CHUNK,
            log_file: None,
        }
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Picks up `WRAP_LOG` from the process environment.
    pub fn with_env(self) -> Self {
        self.with_log_file(std::env::var_os(LOG_ENV))
    }

    fn with_log_file(mut self, value: Option<OsString>) -> Self {
        self.log_file = value.filter(|v| !v.is_empty()).map(PathBuf::from);
        self
    }
}
