// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A small generalized event loop shared by the prisoner I/O bridge
//! (`supervisor`) and the operator visitation loop (`visitation`).
//!
//! Each watched FD is a trait object: an [`EventSource`] owns its FD and
//! decides, on every wakeup, whether the loop should keep going. This keeps
//! the multiplexer itself agnostic to how many FD pairs it's bridging or
//! what each one does with its bytes.

use std::io;
use std::os::fd::{BorrowedFd, RawFd};

use anyhow::{Context, Result};
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags};

use crate::signals::{self, SigSet, SignalFd};

/// Raw, fd-number-based read/write used by both [`crate::supervisor`] and
/// [`crate::visitation`]: the FDs being shuttled (PTY master, raw host
/// stdin/stdout) don't always have a single clear [`std::os::fd::OwnedFd`]
/// owner on both the read and write side, so these go directly through
/// `libc` rather than through `nix`'s `AsFd`-based wrappers, the same way
/// `signals.rs` does for `signalfd`.
pub(crate) fn read_fd(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

pub(crate) fn write_fd(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    let n = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// True if `err` is `EAGAIN`/`EWOULDBLOCK` — the "drained for now" signal an
/// edge-triggered [`EventSource::on_readable`] loop reads until.
pub(crate) fn is_would_block(err: &io::Error) -> bool {
    // EWOULDBLOCK and EAGAIN are the same value on Linux.
    err.raw_os_error() == Some(libc::EAGAIN)
}

/// Whether the event loop should keep running after a source handled an
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continue {
    Keep,
    Stop,
}

/// One FD the loop multiplexes over. Implementors drain their FD to
/// `EAGAIN` on every wakeup, since the loop watches with edge-triggered
/// epoll and a single read per wakeup would leave bytes stranded until the
/// next event.
pub trait EventSource {
    fn fd(&self) -> BorrowedFd<'_>;

    /// Called when `fd()` is readable. Draining to `EAGAIN` is the
    /// implementor's responsibility.
    fn on_readable(&mut self) -> Result<Continue>;
}

/// A tiny identifier so sources can be matched back from their `EpollEvent`.
type Token = u64;

/// Single-threaded, edge-triggered epoll multiplexer over a fixed set of
/// [`EventSource`]s plus an optional `SIGCHLD` watch delivered through a
/// `signalfd`.
pub struct EpollLoop {
    epoll: Epoll,
    signal_fd: Option<SignalFd>,
    saved_mask: Option<SigSet>,
}

impl EpollLoop {
    /// Creates the loop. If `watch_sigchld` is true, `SIGCHLD` is blocked via
    /// `sigprocmask` and routed to a `signalfd` registered as token `0`;
    /// sources passed to [`Self::run`] are registered starting at token `1`.
    pub fn new(watch_sigchld: bool) -> Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).context("epoll_create1 failed")?;

        let (signal_fd, saved_mask) = if watch_sigchld {
            let mut mask = SigSet::empty().context("sigemptyset failed")?;
            mask.add_signal(libc::SIGCHLD).context("sigaddset failed")?;
            let saved = signals::block(&mask).context("sigprocmask(SIG_BLOCK) failed")?;

            let sfd = SignalFd::new(&mask, libc::SFD_CLOEXEC | libc::SFD_NONBLOCK)
                .context("signalfd creation failed")?;
            epoll
                .add(&sfd, EpollEvent::new(EpollFlags::EPOLLIN, 0))
                .context("epoll_ctl(ADD, signalfd) failed")?;
            (Some(sfd), Some(saved))
        } else {
            (None, None)
        };

        Ok(Self {
            epoll,
            signal_fd,
            saved_mask,
        })
    }

    /// Runs the loop until a source returns [`Continue::Stop`] or, if
    /// watching `SIGCHLD`, the child exits. `sources` are registered at
    /// tokens `1..`.
    pub fn run(mut self, mut sources: Vec<Box<dyn EventSource>>) -> Result<()> {
        for (i, source) in sources.iter().enumerate() {
            let token = (i + 1) as Token;
            self.epoll
                .add(source.fd(), EpollEvent::new(EpollFlags::EPOLLIN | EpollFlags::EPOLLET, token))
                .with_context(|| format!("epoll_ctl(ADD, token={token}) failed"))?;
        }

        let mut events = [EpollEvent::empty(); 16];
        'outer: loop {
            let n = self.epoll.wait(&mut events, -1).context("epoll_wait failed")?;
            for event in &events[..n] {
                let token = event.data();

                if token == 0 {
                    if let Some(sfd) = self.signal_fd.as_mut() {
                        while let Some(_siginfo) = sfd.read_signal().context("signalfd read failed")? {
                            // Any SIGCHLD on this FD means the prisoner exited.
                            break 'outer;
                        }
                    }
                    continue;
                }

                let idx = (token - 1) as usize;
                if let Some(source) = sources.get_mut(idx) {
                    if source.on_readable()? == Continue::Stop {
                        break 'outer;
                    }
                }
            }
        }

        Ok(())
    }
}

impl Drop for EpollLoop {
    fn drop(&mut self) {
        // Restore sigprocmask explicitly rather than leaking the SIGCHLD
        // block into whatever runs next in this process.
        if let Some(saved) = self.saved_mask.take() {
            if let Err(err) = signals::restore_mask(&saved) {
                tracing::warn!(%err, "failed to restore sigprocmask on EpollLoop teardown");
            }
        }
    }
}
