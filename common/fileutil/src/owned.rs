// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Owner-stamped filesystem primitives used to assemble jail root
//! filesystems: recursive directory creation, file/device creation along a
//! path, all chowned to a target uid/gid as they are created.

use std::fs::OpenOptions;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Component, Path};

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::stat::{makedev, mknod as nix_mknod, mode_t, Mode, SFlag};
use nix::unistd::{chown, mkdir as nix_mkdir, Gid, Uid};

/// Default permission bits applied to intermediate directories created while
/// walking a path. The terminal component of a [`mkdir_owned`] call uses the
/// caller-supplied `mode` instead.
const DEFAULT_DIR_PERM: u32 = 0o755;

/// The kind of node [`mknod_owned`] should create.
///
/// The literal string `"char"` selects a character device, and everything
/// else (including `"block"`) falls back to a regular file. Block devices
/// cannot be declared; see DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Char,
    Regular,
}

impl NodeKind {
    pub fn from_type_str(s: &str) -> Self {
        if s == "char" {
            NodeKind::Char
        } else {
            NodeKind::Regular
        }
    }

    fn sflag(self) -> SFlag {
        match self {
            NodeKind::Char => SFlag::S_IFCHR,
            NodeKind::Regular => SFlag::S_IFREG,
        }
    }
}

fn mkdir_if_missing(path: &Path, mode: Mode) -> Result<()> {
    match nix_mkdir(path, mode) {
        Ok(()) | Err(Errno::EEXIST) => Ok(()),
        Err(e) => Err(e).with_context(|| format!("mkdir failed: {}", path.display())),
    }
}

fn chown_path(path: &Path, uid: Uid, gid: Gid) -> Result<()> {
    chown(path, Some(uid), Some(gid))
        .with_context(|| format!("chown failed: {}", path.display()))
}

/// Recursively creates `path`, chowning every directory it creates (including
/// ones that already existed from a previous partial run) to `(uid, gid)`.
///
/// Intermediate directories are created with [`DEFAULT_DIR_PERM`]. If
/// `path_only` is `false`, the terminal directory is created with `mode`
/// instead. `EEXIST` at any level is treated as success. A failure partway
/// through the walk leaves whatever directories were already created in
/// place; this function does not roll back.
pub fn mkdir_owned(path: &Path, mode: u32, uid: Uid, gid: Gid, path_only: bool) -> Result<()> {
    anyhow::ensure!(path.is_absolute(), "path must be absolute: {}", path.display());

    let components: Vec<Component> = path.components().collect();
    let mut current = std::path::PathBuf::from("/");

    for (i, component) in components.iter().enumerate() {
        if matches!(component, Component::RootDir) {
            continue;
        }
        current.push(component);

        let is_last = i == components.len() - 1;
        let perm_bits = if is_last && !path_only { mode } else { DEFAULT_DIR_PERM };
        let perm_mode = Mode::from_bits(perm_bits as mode_t)
            .with_context(|| format!("invalid mode bits: {:o}", perm_bits))?;

        if is_last && path_only {
            // Caller only wants the parent chain; don't create the leaf.
            break;
        }

        mkdir_if_missing(&current, perm_mode)?;
        chown_path(&current, uid, gid)?;
    }

    Ok(())
}

/// Ensures every parent directory of `path` exists (owned by `(uid, gid)`),
/// then creates `path` itself as an empty regular file with permission
/// `0755` (the repository's "default file perm" — see DESIGN.md, this is
/// almost certainly too permissive for non-executable stub files, but is
/// preserved as-is), and chowns it.
pub fn touch_owned(path: &Path, uid: Uid, gid: Gid) -> Result<()> {
    anyhow::ensure!(path.is_absolute(), "path must be absolute: {}", path.display());

    mkdir_owned(path, DEFAULT_DIR_PERM, uid, gid, true)?;

    OpenOptions::new()
        .write(true)
        .create(true)
        .mode(DEFAULT_DIR_PERM)
        .open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    chown_path(path, uid, gid)
}

/// Creates a character device or regular node at `path` and chowns it to
/// `(uid, gid)`. Parent directories must already exist; callers typically
/// precede this with [`mkdir_owned`] (`path_only = true`) on `path`'s parent.
pub fn mknod_owned(
    path: &Path,
    kind: NodeKind,
    major: u64,
    minor: u64,
    perm: u32,
    uid: Uid,
    gid: Gid,
) -> Result<()> {
    if major == 0 {
        return Err(Errno::EINVAL)
            .with_context(|| format!("device major number must be nonzero: {}", path.display()));
    }

    let mode = Mode::from_bits(perm as mode_t)
        .with_context(|| format!("invalid mode bits: {:o}", perm))?;
    let dev = makedev(major, minor);

    nix_mknod(path, kind.sflag(), mode, dev)
        .with_context(|| format!("mknod failed: {}", path.display()))?;
    chown_path(path, uid, gid)
}

/// Toggles `O_NONBLOCK` on `fd` via `fcntl(F_GETFL/F_SETFL)`.
pub fn set_blocking(fd: BorrowedFd, enabled: bool) -> Result<()> {
    let current = fcntl(fd.as_fd(), FcntlArg::F_GETFL).context("fcntl(F_GETFL) failed")?;
    let mut flags = OFlag::from_bits_truncate(current);
    if enabled {
        flags.remove(OFlag::O_NONBLOCK);
    } else {
        flags.insert(OFlag::O_NONBLOCK);
    }
    fcntl(fd.as_fd(), FcntlArg::F_SETFL(flags)).context("fcntl(F_SETFL) failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SafeTempDir;
    use nix::unistd::{getgid, getuid};
    use std::os::fd::AsFd;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn mkdir_owned_creates_nested_dirs() -> Result<()> {
        let dir = SafeTempDir::new()?;
        let target = dir.path().join("a/b/c");
        mkdir_owned(&target, 0o700, getuid(), getgid(), false)?;
        assert!(target.is_dir());
        let mode = std::fs::metadata(&target)?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
        Ok(())
    }

    #[test]
    fn mkdir_owned_path_only_skips_leaf() -> Result<()> {
        let dir = SafeTempDir::new()?;
        let target = dir.path().join("a/b/c");
        mkdir_owned(&target, 0o700, getuid(), getgid(), true)?;
        assert!(target.parent().unwrap().is_dir());
        assert!(!target.exists());
        Ok(())
    }

    #[test]
    fn mkdir_owned_tolerates_existing_dirs() -> Result<()> {
        let dir = SafeTempDir::new()?;
        let target = dir.path().join("a/b");
        mkdir_owned(&target, 0o755, getuid(), getgid(), false)?;
        // Running again must not fail on EEXIST.
        mkdir_owned(&target, 0o755, getuid(), getgid(), false)?;
        Ok(())
    }

    #[test]
    fn touch_owned_creates_file_and_parents() -> Result<()> {
        let dir = SafeTempDir::new()?;
        let target = dir.path().join("x/y/stub");
        touch_owned(&target, getuid(), getgid())?;
        assert!(target.is_file());
        Ok(())
    }

    #[test]
    fn mknod_owned_rejects_major_zero() -> Result<()> {
        let dir = SafeTempDir::new()?;
        let target = dir.path().join("zero");
        let err = mknod_owned(&target, NodeKind::Char, 0, 0, 0o666, getuid(), getgid())
            .expect_err("major=0 must be rejected");
        assert!(err.to_string().contains("major"));
        assert!(!target.exists());
        Ok(())
    }

    #[test]
    fn set_blocking_round_trips() -> Result<()> {
        let (r, _w) = nix::unistd::pipe()?;
        set_blocking(r.as_fd(), false)?;
        let flags = fcntl(r.as_fd(), FcntlArg::F_GETFL)?;
        assert!(OFlag::from_bits_truncate(flags).contains(OFlag::O_NONBLOCK));

        set_blocking(r.as_fd(), true)?;
        let flags = fcntl(r.as_fd(), FcntlArg::F_GETFL)?;
        assert!(!OFlag::from_bits_truncate(flags).contains(OFlag::O_NONBLOCK));
        Ok(())
    }
}
