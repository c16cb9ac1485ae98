use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use libc::c_char;

use super::ChildError;

/// Env binary used by `--use-env` when no path is given.
pub const DEFAULT_ENV: &str = "/usr/bin/env";

/// The program to run, its arguments, and an optional env shim in front of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCommand {
    program: OsString,
    args: Vec<OsString>,
    env_shim: Option<PathBuf>,
}

impl ChildCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env_shim: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs the program as `env_shim PROGRAM ARGS...`.
    pub fn env_shim(mut self, shim: impl Into<PathBuf>) -> Self {
        self.env_shim = Some(shim.into());
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn shim(&self) -> Option<&Path> {
        self.env_shim.as_deref()
    }

    /// The full argument vector handed to exec, shim first when present.
    pub fn argv(&self) -> Vec<&OsStr> {
        self.env_shim
            .iter()
            .map(|shim| shim.as_os_str())
            .chain(std::iter::once(self.program.as_os_str()))
            .chain(self.args.iter().map(OsString::as_os_str))
            .collect()
    }

    /// Converts to C strings up front; nothing may allocate after fork.
    pub(crate) fn exec_plan(&self) -> Result<ExecPlan, ChildError> {
        let argv = self
            .argv()
            .into_iter()
            .map(to_cstring)
            .collect::<Result<Vec<_>, _>>()?;
        let path = match &self.env_shim {
            Some(shim) => to_cstring(shim.as_os_str())?,
            None => to_cstring(&self.program)?,
        };
        Ok(ExecPlan {
            path,
            argv,
            search_path: self.env_shim.is_none(),
        })
    }
}

/// Pre-built exec arguments.
pub(crate) struct ExecPlan {
    path: CString,
    argv: Vec<CString>,
    search_path: bool,
}

impl ExecPlan {
    pub(crate) fn path(&self) -> &CString {
        &self.path
    }

    /// Plain program names go through `PATH`; a shim path is executed as is.
    pub(crate) fn search_path(&self) -> bool {
        self.search_path
    }

    /// NULL-terminated pointer array borrowing from `self`.
    pub(crate) fn argv_ptrs(&self) -> Vec<*const c_char> {
        self.argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect()
    }
}

fn to_cstring(value: &OsStr) -> Result<CString, ChildError> {
    CString::new(value.as_bytes()).map_err(|_| ChildError::InvalidArgument {
        arg: value.to_string_lossy().into_owned(),
    })
}
