//! Full sessions with a pseudo-terminal standing in for the user's terminal.

mod common;

use std::fs::File;
use std::io::Write;
use std::os::fd::{AsFd, AsRawFd};
use std::thread;
use std::time::Duration;

use common::{drain, pty_size};
use linewrap::child::{ChildCommand, ChildError, ChildState, ExitResult};
use linewrap::plumbing::Topology;
use linewrap::terminal::TerminalController;
use linewrap::{Session, WrapConfig, WrapError};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::pty::{openpty, OpenptyResult};
use nix::sys::signal::Signal;
use nix::sys::termios::{tcgetattr, LocalFlags};
use nix::sys::wait::{waitpid, WaitStatus};

fn sh(script: &str) -> ChildCommand {
    ChildCommand::new("sh").args(["-c", script])
}

fn user_terminal(rows: u16, cols: u16) -> OpenptyResult {
    openpty(Some(&pty_size(rows, cols)), None).unwrap()
}

/// Everything the session printed, read from the terminal's master side.
fn screen_of(master: &File) -> String {
    let mut screen = Vec::new();
    let mut fds = [PollFd::new(master.as_fd(), PollFlags::POLLIN)];
    while poll(&mut fds, PollTimeout::from(200u16)).unwrap_or(0) > 0 {
        let before = screen.len();
        drain(master, &mut screen);
        if screen.len() == before {
            break;
        }
    }
    String::from_utf8_lossy(&screen).into_owned()
}

fn set_nonblocking(file: &File) {
    let fd = file.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL).unwrap());
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).unwrap();
}

#[test]
fn line_is_submitted_and_exit_code_mirrored() {
    let pty = user_terminal(24, 80);
    let probe = pty.slave.try_clone().unwrap();
    let before = tcgetattr(&probe).unwrap();
    let mut master = File::from(pty.master);

    let terminal = TerminalController::from_device(File::from(pty.slave));
    let config = WrapConfig::new(sh("read line; echo \"<$line>\"; exit 4"));
    let mut session = Session::with_terminal(config, terminal).unwrap();

    master.write_all(b"hi\n").unwrap();
    let result = session.run().unwrap();
    assert_eq!(result, ExitResult::Exited(4));
    assert_eq!(session.child().state(), ChildState::Reaped(result));
    drop(session);

    let after = tcgetattr(&probe).unwrap();
    assert_eq!(after.local_flags, before.local_flags);
    assert!(after.local_flags.contains(LocalFlags::ICANON));

    set_nonblocking(&master);
    let screen = screen_of(&master);
    assert!(screen.contains("<hi>"), "screen was {screen:?}");
}

#[test]
fn exec_failure_leaves_terminal_cooked() {
    let pty = user_terminal(24, 80);
    let probe = pty.slave.try_clone().unwrap();
    let before = tcgetattr(&probe).unwrap();

    let terminal = TerminalController::from_device(File::from(pty.slave));
    let config = WrapConfig::new(ChildCommand::new("linewrap-no-such-program"));
    let mut session = Session::with_terminal(config, terminal).unwrap();

    let err = session.run().unwrap_err();
    assert!(
        matches!(err, WrapError::Child(ChildError::Exec { .. })),
        "unexpected error: {err}"
    );
    assert_eq!(err.exit_code(), 1);
    assert!(!session.child().is_alive());

    let after = tcgetattr(&probe).unwrap();
    assert_eq!(after.local_flags, before.local_flags);
    drop(pty.master);
}

#[test]
fn nul_in_argument_is_a_setup_error() {
    let pty = user_terminal(24, 80);
    let probe = pty.slave.try_clone().unwrap();
    let before = tcgetattr(&probe).unwrap();

    let terminal = TerminalController::from_device(File::from(pty.slave));
    let config = WrapConfig::new(ChildCommand::new("echo").arg("a\0b"));
    let mut session = Session::with_terminal(config, terminal).unwrap();

    let err = session.run().unwrap_err();
    assert!(matches!(
        err,
        WrapError::Child(ChildError::InvalidArgument { .. })
    ));
    assert_eq!(session.child().state(), ChildState::NotStarted);
    assert_eq!(tcgetattr(&probe).unwrap().local_flags, before.local_flags);
    drop(pty.master);
}

#[test]
fn pty_topology_gives_child_the_window_size() {
    let pty = user_terminal(30, 100);
    let master = File::from(pty.master);
    set_nonblocking(&master);

    let terminal = TerminalController::from_device(File::from(pty.slave));
    let config =
        WrapConfig::new(sh("stty size; test -t 0 && echo tty")).with_topology(Topology::Pty);
    let mut session = Session::with_terminal(config, terminal).unwrap();

    let result = session.run().unwrap();
    assert_eq!(result, ExitResult::Exited(0));
    drop(session);

    let screen = screen_of(&master);
    assert!(screen.contains("30 100"), "screen was {screen:?}");
    assert!(screen.contains("tty"), "screen was {screen:?}");
}

#[test]
fn pty_output_is_copied_verbatim() {
    let pty = user_terminal(24, 80);
    let master = File::from(pty.master);
    set_nonblocking(&master);

    let terminal = TerminalController::from_device(File::from(pty.slave));
    let config = WrapConfig::new(sh("printf top; sleep 0.2; printf '\\033[5;1Hrow5'"))
        .with_topology(Topology::Pty);
    let mut session = Session::with_terminal(config, terminal).unwrap();

    assert_eq!(session.run().unwrap(), ExitResult::Exited(0));
    drop(session);

    let screen = screen_of(&master);
    assert_eq!(screen, "top\x1b[5;1Hrow5");
}

#[test]
fn fatal_relay_error_terminates_child_and_restores_terminal() {
    let pty = user_terminal(24, 80);
    let probe = pty.slave.try_clone().unwrap();
    let before = tcgetattr(&probe).unwrap();
    let master = File::from(pty.master);

    // The child closes its input but stays alive, so the submitted line hits
    // a broken pipe.
    let terminal = TerminalController::from_device(File::from(pty.slave));
    let config = WrapConfig::new(sh("exec 0<&-; exec sleep 30"));
    let mut session = Session::with_terminal(config, terminal).unwrap();

    let mut keys = master.try_clone().unwrap();
    let typist = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        keys.write_all(b"x\n").unwrap();
    });

    let err = session.run().unwrap_err();
    typist.join().unwrap();
    assert!(err.to_string().contains("failed to send line"), "error was {err}");
    assert_eq!(err.exit_code(), 1);

    let pid = session.child().pid().expect("child not reaped by the session");
    assert_eq!(
        waitpid(pid, None).unwrap(),
        WaitStatus::Signaled(pid, Signal::SIGTERM, false)
    );

    let after = tcgetattr(&probe).unwrap();
    assert_eq!(after.local_flags, before.local_flags);
    drop(master);
}
