// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Jail builder: scratch tmpfs creation, rootfs assembly, and the mirrored
//! teardown in [`cleanup`].

mod rootfs;
mod stdio;

pub use rootfs::build_rootfs;
pub use stdio::create_stdio_for_prisoner;

use std::ffi::CString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::unistd::{Gid, Uid};
use tracing::{info, warn};

use crate::context::{validate_mount_template, JailContext};

/// `mkdtemp(3)` isn't wrapped by `nix`; call the libc function directly.
fn mkdtemp(template: &Path) -> Result<PathBuf> {
    let c_template = CString::new(template.as_os_str().as_encoded_bytes())
        .context("mount point template contains a NUL byte")?;
    let mut bytes = c_template.into_bytes_with_nul();

    let ptr = unsafe { libc::mkdtemp(bytes.as_mut_ptr() as *mut libc::c_char) };
    if ptr.is_null() {
        return Err(std::io::Error::last_os_error())
            .context("mkdtemp failed")?;
    }

    bytes.pop(); // drop the NUL terminator before building the PathBuf.
    Ok(PathBuf::from(String::from_utf8(bytes).context("mkdtemp produced non-UTF-8 path")?))
}

/// Creates the scratch tmpfs: `mkdtemp`s `template`, then mounts a fresh
/// tmpfs on it owned by the prisoner. Both steps are fatal on failure.
pub fn create_jail(template: &Path, uid: Uid, gid: Gid) -> Result<PathBuf> {
    validate_mount_template(template)?;

    let mount_point = mkdtemp(template)?;
    info!(mount_point = %mount_point.display(), "created scratch directory");

    let data = format!("size=96m,uid={},gid={},mode=700", uid.as_raw(), gid.as_raw());
    mount(
        Some("tmpfs"),
        &mount_point,
        Some("tmpfs"),
        MsFlags::empty(),
        Some(data.as_str()),
    )
    .with_context(|| format!("failed to mount scratch tmpfs at {}", mount_point.display()))?;

    Ok(mount_point)
}

/// Tears the jail down in the reverse of construction order: bind mounts,
/// then the outer tmpfs, then the mount point directory, then both FIFOs.
/// Every step logs and continues rather than aborting.
pub fn cleanup(ctx: &JailContext) {
    for bind in ctx.bind_entries.iter().rev() {
        if let Err(err) = umount2(bind.as_path(), MntFlags::MNT_DETACH) {
            warn!(path = %bind.display(), %err, "failed to unmount bind entry during cleanup");
        }
    }

    if let Some(mount_point) = &ctx.mount_point {
        if let Err(err) = umount2(mount_point.as_path(), MntFlags::MNT_DETACH) {
            warn!(path = %mount_point.display(), %err, "failed to unmount scratch tmpfs during cleanup");
        }
        if let Err(err) = std::fs::remove_dir(mount_point) {
            warn!(path = %mount_point.display(), %err, "failed to remove mount point during cleanup");
        }
    }

    for path in [ctx.stdin_path(), ctx.stdout_path()] {
        if let Err(err) = std::fs::remove_file(&path) {
            warn!(path = %path.display(), %err, "failed to unlink stdio FIFO during cleanup");
        }
    }
}
