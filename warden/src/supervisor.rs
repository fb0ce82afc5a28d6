// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Prisoner supervisor: spawns the target program under a controlling PTY,
//! performs the in-child privilege-reduction transition before `exec`, and
//! runs the parent-side I/O bridge between the external stdin/stdout FIFOs
//! and the PTY master.

use std::ffi::CString;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use nix::fcntl::{open, OFlag};
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::stat::Mode;
use nix::sys::termios::{tcgetattr, Termios};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{chdir, chroot, dup, execvp, setgid, setgroups, setuid, ForkResult, Pid};
use tracing::{info, warn};

use crate::bridge::{is_would_block, read_fd, write_fd, Continue, EpollLoop, EventSource};
use crate::capabilities;
use crate::context::JailContext;

const BUFFER_SIZE: usize = 8192;

/// Reads the saved host terminal attributes and window size off `STDIN`, for
/// [`forkpty`] to apply to the prisoner's PTY slave. Either piece is
/// optional: a `warden` invoked with stdin not attached to a terminal (e.g.
/// under a test harness) simply gets PTY defaults.
fn host_terminal_state() -> (Option<Termios>, Option<Winsize>) {
    let termios = tcgetattr(std::io::stdin()).ok();
    let winsize = {
        let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::ioctl(libc::STDIN_FILENO, libc::TIOCGWINSZ, &mut ws) };
        if ret == 0 {
            Some(Winsize {
                ws_row: ws.ws_row,
                ws_col: ws.ws_col,
                ws_xpixel: ws.ws_xpixel,
                ws_ypixel: ws.ws_ypixel,
            })
        } else {
            None
        }
    };
    (termios, winsize)
}

/// Forks the prisoner under a controlling PTY. In the child, runs the
/// ordered privilege-transition steps and `exec`s — this call never returns
/// on that branch. In the parent, records the prisoner's pid on `ctx` and
/// returns the PTY master end.
pub fn spawn(ctx: &mut JailContext) -> Result<OwnedFd> {
    let (termios, winsize) = host_terminal_state();

    // SAFETY: forkpty forks the process; the child branch below only calls
    // async-signal-safe-equivalent operations (chroot/chdir/setuid/exec and
    // friends) before exec or exit, same discipline as glibc's forkpty(3).
    let ForkptyResult { master, fork_result } =
        unsafe { forkpty(winsize.as_ref(), termios.as_ref()) }.context("forkpty failed")?;

    match fork_result {
        ForkResult::Child => child_main(ctx),
        ForkResult::Parent { child } => {
            info!(pid = child.as_raw(), "spawned prisoner");
            ctx.pid = Some(child);
            Ok(master)
        }
    }
}

/// The in-child privilege-reduction transition: chroot, reset the
/// environment, drop capabilities, switch uid/gid, then exec. Any failure
/// exits the child with code 2; this function never returns.
fn child_main(ctx: &JailContext) -> ! {
    match try_child_main(ctx) {
        Ok(never) => match never {},
        Err(err) => {
            eprintln!("warden: prisoner transition failed: {err:?}");
            std::process::exit(2);
        }
    }
}

fn try_child_main(ctx: &JailContext) -> Result<std::convert::Infallible> {
    let mount_point = ctx
        .mount_point
        .as_ref()
        .context("mount point not set before prisoner spawn")?;
    chroot(mount_point).context("chroot failed")?;

    let home = reset_environment(ctx).context("reset_environment failed")?;

    chdir("/").context("chdir(/) failed")?;

    let (uid, gid) = match &ctx.user {
        Some(user) => (user.uid, user.gid),
        None => bail!("no user resolved for prisoner"),
    };

    fileutil::mkdir_owned(&home, 0o755, uid, gid, false).context("mkdir of prisoner home failed")?;

    capabilities::drop_capabilities(&ctx.config.keep_capability)
        .context("drop_capabilities failed")?;

    setgid(gid).context("setgid failed")?;
    setgroups(&[gid]).context("setgroups failed")?;
    setuid(uid).context("setuid failed")?;

    chdir(&home).context("chdir(home) failed")?;

    let argv: Vec<CString> = ctx
        .argv
        .iter()
        .map(|arg| CString::new(arg.as_str()).context("argv element contains a NUL byte"))
        .collect::<Result<_>>()?;
    let program = argv.first().context("argv is empty")?.clone();

    execvp(&program, &argv).context("execvp failed")?;
    unreachable!("execvp returns only on error, which is handled above")
}

/// Clears the environment, applies `HOME`/`SHELL`/`USER`/`TERM` defaults
/// only where unset, overlays the configuration's `environment` mapping,
/// then re-reads `HOME` back out so the caller can `mkdir`/`chdir` into
/// whatever the final value turned out to be.
fn reset_environment(ctx: &JailContext) -> Result<PathBuf> {
    for (key, _) in std::env::vars() {
        std::env::remove_var(key);
    }

    if std::env::var_os("HOME").is_none() {
        std::env::set_var("HOME", &ctx.home);
    }
    if std::env::var_os("SHELL").is_none() {
        std::env::set_var("SHELL", &ctx.shell);
    }
    if std::env::var_os("USER").is_none() {
        let name = ctx.user.as_ref().map(|u| u.name.as_str()).unwrap_or("");
        std::env::set_var("USER", name);
    }
    if std::env::var_os("TERM").is_none() {
        std::env::set_var("TERM", &ctx.term);
    }

    for (key, value) in &ctx.config.environment {
        std::env::set_var(key, value);
    }

    Ok(PathBuf::from(std::env::var_os("HOME").unwrap_or_default()))
}

fn open_fifo(path: &std::path::Path, flags: OFlag) -> Result<OwnedFd> {
    let fd = open(path, flags, Mode::empty())
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Bridges the PTY master to the two external FIFOs: stdin FIFO -> PTY
/// master, PTY master -> stdout FIFO. Returns
/// once the prisoner exits (observed via `SIGCHLD`), having already sent
/// `SIGTERM`, reaped the prisoner, and written the exit/signal summary line
/// to the stdout FIFO.
pub fn run_bridge(ctx: &JailContext, master: OwnedFd) -> Result<()> {
    let stdout_fifo = open_fifo(&ctx.stdout_path(), OFlag::O_WRONLY)
        .context("failed to open stdout FIFO for the prisoner bridge")?;

    fileutil::set_blocking(master.as_fd(), false).context("set_blocking(master) failed")?;

    let stdin_fifo = open_fifo(&ctx.stdin_path(), OFlag::O_RDONLY)
        .context("failed to open stdin FIFO for the prisoner bridge")?;
    fileutil::set_blocking(stdin_fifo.as_fd(), false).context("set_blocking(stdin) failed")?;

    let master_fd = master.as_raw_fd();
    let stdout_dup_fd = dup(stdout_fifo.as_raw_fd()).context("dup(stdout fifo) failed")?;
    let stdout_dup = unsafe { OwnedFd::from_raw_fd(stdout_dup_fd) };

    let sources: Vec<Box<dyn EventSource>> = vec![
        Box::new(FifoToMaster {
            fifo: stdin_fifo,
            master_fd,
        }),
        Box::new(MasterToFifo {
            master_fd,
            fifo: stdout_dup,
        }),
    ];

    let epoll_loop = EpollLoop::new(true)?;
    epoll_loop.run(sources)?;

    let pid = ctx.pid.context("prisoner pid missing after bridge loop")?;
    if let Err(err) = kill(pid, Signal::SIGTERM) {
        warn!(%err, "failed to SIGTERM prisoner after bridge loop exit");
    }

    let status = waitpid(pid, None).context("waitpid on prisoner failed")?;
    let summary = summarize_status(pid, &status);
    info!("{}", summary);
    let line = format!("{summary}\r\n");
    let _ = write_fd(stdout_fifo.as_raw_fd(), line.as_bytes());

    drop(master);
    Ok(())
}

fn summarize_status(pid: Pid, status: &WaitStatus) -> String {
    match status {
        WaitStatus::Exited(_, code) => format!("prisoner {pid} exited with status {code}"),
        WaitStatus::Signaled(_, signal, _) => format!("prisoner {pid} terminated by signal {signal}"),
        other => format!("prisoner {pid} ended: {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_status_exited() {
        let pid = Pid::from_raw(1234);
        let status = WaitStatus::Exited(pid, 0);
        assert_eq!(summarize_status(pid, &status), "prisoner 1234 exited with status 0");
    }

    #[test]
    fn summarize_status_exited_nonzero() {
        let pid = Pid::from_raw(1234);
        let status = WaitStatus::Exited(pid, 17);
        assert_eq!(summarize_status(pid, &status), "prisoner 1234 exited with status 17");
    }

    #[test]
    fn summarize_status_signaled() {
        let pid = Pid::from_raw(42);
        let status = WaitStatus::Signaled(pid, Signal::SIGKILL, false);
        assert!(summarize_status(pid, &status).contains("terminated by signal"));
    }
}

struct FifoToMaster {
    fifo: OwnedFd,
    master_fd: RawFd,
}

impl EventSource for FifoToMaster {
    fn fd(&self) -> BorrowedFd<'_> {
        self.fifo.as_fd()
    }

    fn on_readable(&mut self) -> Result<Continue> {
        let mut buf = [0u8; BUFFER_SIZE];
        loop {
            match read_fd(self.fifo.as_raw_fd(), &mut buf) {
                Ok(0) => return Ok(Continue::Keep),
                Ok(n) => {
                    if let Err(err) = write_fd(self.master_fd, &buf[..n]) {
                        warn!(%err, "write to pty master failed");
                    }
                }
                Err(err) if is_would_block(&err) => return Ok(Continue::Keep),
                Err(err) => {
                    warn!(%err, "read from stdin fifo failed");
                    return Ok(Continue::Keep);
                }
            }
        }
    }
}

struct MasterToFifo {
    master_fd: RawFd,
    fifo: OwnedFd,
}

impl EventSource for MasterToFifo {
    fn fd(&self) -> BorrowedFd<'_> {
        unsafe { BorrowedFd::borrow_raw(self.master_fd) }
    }

    fn on_readable(&mut self) -> Result<Continue> {
        let mut buf = [0u8; BUFFER_SIZE];
        loop {
            match read_fd(self.master_fd, &mut buf) {
                Ok(0) => return Ok(Continue::Keep),
                Ok(n) => {
                    if let Err(err) = write_fd(self.fifo.as_raw_fd(), &buf[..n]) {
                        warn!(%err, "write to stdout fifo failed");
                    }
                }
                // EIO on the PTY master means the slave side (prisoner) has
                // closed; the bridge loop will exit shortly via SIGCHLD.
                Err(err) if err.raw_os_error() == Some(libc::EIO) => return Ok(Continue::Keep),
                Err(err) if is_would_block(&err) => return Ok(Continue::Keep),
                Err(err) => {
                    warn!(%err, "read from pty master failed");
                    return Ok(Continue::Keep);
                }
            }
        }
    }
}
