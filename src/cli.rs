use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

use crate::child::{ChildCommand, DEFAULT_ENV};
use crate::config::WrapConfig;
use crate::plumbing::Topology;

/// Adds line editing to programs that read raw terminal input.
#[derive(Debug, Parser)]
#[command(name = "wrap", version)]
pub struct Cli {
    /// Run PROGRAM through an env binary [default: /usr/bin/env]
    #[arg(
        long = "use-env",
        value_name = "ENV",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = DEFAULT_ENV
    )]
    pub use_env: Option<PathBuf>,

    /// Give the child a pseudo-terminal instead of pipes
    #[arg(long)]
    pub pty: bool,

    /// PROGRAM followed by its arguments, passed through verbatim
    #[arg(
        value_name = "PROGRAM",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<OsString>,
}

impl Cli {
    pub fn into_config(self) -> WrapConfig {
        let mut words = self.command.into_iter();
        let program = words.next().unwrap_or_default();
        let mut command = ChildCommand::new(program).args(words);
        if let Some(shim) = self.use_env {
            command = command.env_shim(shim);
        }
        let topology = if self.pty {
            Topology::Pty
        } else {
            Topology::Pipes
        };
        WrapConfig::new(command).with_topology(topology)
    }
}
