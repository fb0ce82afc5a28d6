// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Operator-side visitation loop: bridges the host terminal to the
//! prisoner's stdio FIFOs so a human can attach, whether that's the
//! launching process's own visitation session or a later `-a`/`--attach`
//! invocation.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

use anyhow::{Context, Result};
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::sys::termios::{cfmakeraw, tcgetattr, tcsetattr, SetArg, SpecialCharacterIndices, Termios};
use tracing::warn;

use crate::bridge::{is_would_block, read_fd, write_fd, Continue, EpollLoop, EventSource};

const BUFFER_SIZE: usize = 8192;

/// Ctrl-D, the byte the visitation loop treats as a detach request when it
/// is the first byte of a read chunk from the host terminal.
const DETACH_BYTE: u8 = 0x04;

/// Saves the host terminal's attributes on construction, puts it in raw
/// mode (`cfmakeraw`, `VMIN=1`, `VTIME=0`) and non-blocking, and restores
/// both on drop — covering every exit path out of the visitation loop, not
/// just the happy one.
struct TerminalGuard {
    fd: RawFd,
    saved: Termios,
}

impl TerminalGuard {
    fn enter(fd: RawFd) -> Result<Self> {
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        let saved = tcgetattr(borrowed).context("tcgetattr failed")?;

        let mut raw = saved.clone();
        cfmakeraw(&mut raw);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        tcsetattr(borrowed, SetArg::TCSAFLUSH, &raw).context("tcsetattr(raw) failed")?;
        fileutil::set_blocking(borrowed, false).context("set_blocking(host stdin) failed")?;

        Ok(Self { fd, saved })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let borrowed = unsafe { BorrowedFd::borrow_raw(self.fd) };
        if let Err(err) = tcsetattr(borrowed, SetArg::TCSANOW, &self.saved) {
            warn!(%err, "failed to restore host terminal attributes");
        }
        if let Err(err) = fileutil::set_blocking(borrowed, true) {
            warn!(%err, "failed to restore host stdin to blocking mode");
        }
    }
}

fn open_fifo(path: &Path, flags: OFlag) -> Result<OwnedFd> {
    let fd = open(path, flags, Mode::empty())
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Runs the operator-side visitation loop until the prisoner's stdout FIFO
/// closes or Ctrl-D is read as the first byte of a host-stdin chunk.
///
/// The stdin FIFO is opened read/write, not write-only, so its reader end
/// never observes EOF while this visitation session holds it open — see
/// DESIGN.md for the recorded rationale on this and on `-a` requiring
/// pre-existing FIFOs.
pub fn run_visitation(stdin_path: &Path, stdout_path: &Path) -> Result<()> {
    let _terminal_guard = TerminalGuard::enter(libc::STDIN_FILENO)?;

    let stdin_fifo = open_fifo(stdin_path, OFlag::O_RDWR)
        .with_context(|| format!("stdin FIFO {} not found; is the jail running?", stdin_path.display()))?;
    let stdout_fifo = open_fifo(stdout_path, OFlag::O_RDONLY | OFlag::O_NONBLOCK)
        .with_context(|| format!("stdout FIFO {} not found; is the jail running?", stdout_path.display()))?;

    let sources: Vec<Box<dyn EventSource>> = vec![
        Box::new(HostStdinSource { stdin_fifo }),
        Box::new(FifoStdoutSource { stdout_fifo }),
    ];

    let epoll_loop = EpollLoop::new(false)?;
    epoll_loop.run(sources)
}

struct HostStdinSource {
    stdin_fifo: OwnedFd,
}

impl EventSource for HostStdinSource {
    fn fd(&self) -> BorrowedFd<'_> {
        unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) }
    }

    fn on_readable(&mut self) -> Result<Continue> {
        let mut buf = [0u8; BUFFER_SIZE];
        loop {
            match read_fd(libc::STDIN_FILENO, &mut buf) {
                Ok(0) => return Ok(Continue::Keep),
                Ok(n) => {
                    if buf[0] == DETACH_BYTE {
                        print!("^D (detached)\r\n");
                        use std::io::Write;
                        let _ = std::io::stdout().flush();
                        return Ok(Continue::Stop);
                    }
                    if let Err(err) = write_fd(self.stdin_fifo.as_raw_fd(), &buf[..n]) {
                        warn!(%err, "write to prisoner's stdin fifo failed");
                    }
                }
                Err(err) if is_would_block(&err) => return Ok(Continue::Keep),
                Err(err) => {
                    warn!(%err, "read from host stdin failed");
                    return Ok(Continue::Keep);
                }
            }
        }
    }
}

struct FifoStdoutSource {
    stdout_fifo: OwnedFd,
}

impl EventSource for FifoStdoutSource {
    fn fd(&self) -> BorrowedFd<'_> {
        self.stdout_fifo.as_fd()
    }

    fn on_readable(&mut self) -> Result<Continue> {
        let mut buf = [0u8; BUFFER_SIZE];
        loop {
            match read_fd(self.stdout_fifo.as_raw_fd(), &mut buf) {
                Ok(0) => return Ok(Continue::Keep),
                Ok(n) => {
                    use std::io::Write;
                    let mut stdout = std::io::stdout();
                    if stdout.write_all(&buf[..n]).is_ok() {
                        let _ = stdout.flush();
                    }
                }
                Err(err) if is_would_block(&err) => return Ok(Continue::Keep),
                Err(err) => {
                    warn!(%err, "read from prisoner's stdout fifo failed");
                    return Ok(Continue::Keep);
                }
            }
        }
    }
}
