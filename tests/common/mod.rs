//! Shared test utilities: fake terminals and a pty host for the binary.

#![allow(dead_code, unused_imports)]

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::AsFd;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use linewrap::child::{ChildCommand, ChildSupervisor, ExitResult};
use linewrap::plumbing::{self, ChannelProvider, PtyProvider};
use linewrap::relay::TerminalIo;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::pty::Winsize;

pub const SAVE_CURSOR: &[u8] = b"\x1b7";
pub const RESET_LINE: &[u8] = b"\x1b8\x1b[J";

/// A pipe-backed stand-in for the real terminal.
pub struct FakeTerminal {
    /// Write end for simulated keystrokes.
    pub keys: File,
    /// Everything the relay prints, collected until the terminal is dropped.
    pub screen: JoinHandle<Vec<u8>>,
    pub io: TerminalIo,
}

pub fn fake_terminal() -> FakeTerminal {
    let (input, keys) = plumbing::cloexec_pipe().unwrap();
    let (mut screen_read, output) = plumbing::cloexec_pipe().unwrap();
    let screen = thread::spawn(move || {
        let mut all = Vec::new();
        screen_read.read_to_end(&mut all).unwrap();
        all
    });
    FakeTerminal {
        keys,
        screen,
        io: TerminalIo::new(input, output).unwrap(),
    }
}

/// Removes the cursor save and restore-and-clear sequences.
pub fn strip_cursor_codes(screen: &[u8]) -> Vec<u8> {
    let mut plain = Vec::with_capacity(screen.len());
    let mut rest = screen;
    while !rest.is_empty() {
        if rest.starts_with(RESET_LINE) {
            rest = &rest[RESET_LINE.len()..];
        } else if rest.starts_with(SAVE_CURSOR) {
            rest = &rest[SAVE_CURSOR.len()..];
        } else {
            plain.push(rest[0]);
            rest = &rest[1..];
        }
    }
    plain
}

pub fn pty_size(rows: u16, cols: u16) -> Winsize {
    Winsize {
        ws_row: rows,
        ws_col: cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    }
}

/// Runs `program` with a fresh pty as its controlling terminal, types `keys`,
/// and collects the screen until the program exits.
pub fn run_in_pty(program: &str, args: &[&str], keys: &[u8]) -> (ExitResult, String) {
    let (pair, stdio) = PtyProvider::new(None, Some(pty_size(24, 80)))
        .open()
        .unwrap();
    let mut child = ChildSupervisor::new();
    child
        .spawn(&ChildCommand::new(program).args(args), stdio)
        .unwrap();

    let mut input = pair.input();
    input.write_all(keys).unwrap();

    let output = pair.output().unwrap();
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut screen = Vec::new();
    let mut exited = None;
    loop {
        let mut fds = [PollFd::new(output.as_fd(), PollFlags::POLLIN)];
        let _ = poll(&mut fds, PollTimeout::from(50u16));
        drain(output, &mut screen);

        if let Some(result) = exited {
            return (result, String::from_utf8_lossy(&screen).into_owned());
        }
        exited = child.try_wait().unwrap();
        assert!(Instant::now() < deadline, "{program} did not exit");
    }
}

/// Reads whatever is available without blocking.
pub fn drain(mut source: &File, into: &mut Vec<u8>) {
    let mut buf = [0u8; 4096];
    loop {
        match source.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => into.extend_from_slice(&buf[..n]),
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => return,
        }
    }
}
