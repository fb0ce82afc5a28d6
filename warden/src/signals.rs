// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A raw `sigprocmask`/`signalfd` wrapper. `nix` does not expose a
//! `signalfd` API in the feature set this workspace pulls in, so this module
//! rolls a thin wrapper around the three libc calls it needs.

use std::io;
use std::mem::{size_of, MaybeUninit};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use libc::{sigset_t, signalfd_siginfo};

pub struct SigSet(sigset_t);

impl SigSet {
    pub fn empty() -> io::Result<Self> {
        unsafe {
            let mut set = MaybeUninit::<sigset_t>::uninit();
            if libc::sigemptyset(set.as_mut_ptr()) < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(Self(set.assume_init()))
        }
    }

    pub fn add_signal(&mut self, signal: i32) -> io::Result<()> {
        unsafe {
            if libc::sigaddset(&mut self.0, signal) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }
}

/// Blocks `set` for this thread and returns the previously active mask, so
/// it can be restored later with [`restore_mask`].
pub fn block(set: &SigSet) -> io::Result<SigSet> {
    unsafe {
        let mut old = MaybeUninit::<sigset_t>::uninit();
        if libc::sigprocmask(libc::SIG_BLOCK, &set.0, old.as_mut_ptr()) < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(SigSet(old.assume_init()))
    }
}

/// Restores a previously saved mask, so the `SIGCHLD` block doesn't leak
/// past the event loop that set it.
pub fn restore_mask(set: &SigSet) -> io::Result<()> {
    unsafe {
        if libc::sigprocmask(libc::SIG_SETMASK, &set.0, std::ptr::null_mut()) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

pub struct SignalFd(OwnedFd);

impl SignalFd {
    pub fn new(set: &SigSet, flags: libc::c_int) -> io::Result<Self> {
        unsafe {
            let fd = libc::signalfd(-1, &set.0, flags);
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(Self(OwnedFd::from_raw_fd(fd)))
        }
    }

    /// Reads one `signalfd_siginfo`, or `None` on `EAGAIN`.
    pub fn read_signal(&mut self) -> io::Result<Option<signalfd_siginfo>> {
        unsafe {
            let mut siginfo = MaybeUninit::<signalfd_siginfo>::uninit();
            match libc::read(
                self.0.as_raw_fd(),
                siginfo.as_mut_ptr() as *mut libc::c_void,
                size_of::<signalfd_siginfo>(),
            ) {
                n if n == size_of::<signalfd_siginfo>() as isize => Ok(Some(siginfo.assume_init())),
                n if n < 0 && io::Error::last_os_error().raw_os_error() == Some(libc::EAGAIN) => {
                    Ok(None)
                }
                n if n < 0 => Err(io::Error::last_os_error()),
                _ => panic!("partial read from signalfd"),
            }
        }
    }
}

impl AsFd for SignalFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}
