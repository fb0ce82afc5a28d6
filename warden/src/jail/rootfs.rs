// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::path::{Path, PathBuf};

use anyhow::Result;
use fileutil::{mkdir_owned, mknod_owned, touch_owned, NodeKind};
use jail_config::{BindMode, BindSpec, DeviceKind, DeviceSpec, FilesystemConfig, JailConfig};
use nix::mount::{mount, MsFlags};
use nix::unistd::{Gid, Uid};
use tracing::warn;

const DEFAULT_DIR_MODE: u32 = 0o755;

/// Joins a jail-relative absolute path (as found in the configuration) onto
/// the scratch mount point.
fn jail_path(mount_point: &Path, relative: &str) -> PathBuf {
    mount_point.join(relative.trim_start_matches('/'))
}

fn to_node_kind(kind: DeviceKind) -> NodeKind {
    match kind {
        DeviceKind::Char => NodeKind::Char,
        DeviceKind::Regular => NodeKind::Regular,
    }
}

/// Dispatches the four rootfs sub-builders in a fixed order: kernel
/// filesystems, directories, devices, then binds. Each sub-builder
/// tolerates per-item failure; only a failure to build the path itself is
/// propagated here (none currently are — every operation here is logged and
/// skipped rather than aborting the whole build).
pub fn build_rootfs(
    mount_point: &Path,
    cfg: &JailConfig,
    uid: Uid,
    gid: Gid,
) -> Result<Vec<PathBuf>> {
    mount_kernel_filesystems(mount_point, &cfg.filesystem, uid, gid);
    create_directories(mount_point, &cfg.directory, uid, gid);
    create_devices(mount_point, &cfg.device, uid, gid);
    Ok(create_binds(mount_point, &cfg.bind, uid, gid))
}

fn mount_kernel_filesystems(mount_point: &Path, fs: &FilesystemConfig, uid: Uid, gid: Gid) {
    let table: [(bool, &str, &str); 3] = [
        (fs.devtmpfs, "/dev", "devtmpfs"),
        (fs.procfs, "/proc", "proc"),
        (fs.sysfs, "/sys", "sysfs"),
    ];

    for (enabled, path, fstype) in table {
        if !enabled {
            continue;
        }
        let target = jail_path(mount_point, path);
        if let Err(err) = mkdir_owned(&target, DEFAULT_DIR_MODE, uid, gid, false) {
            warn!(%path, %err, "failed to create kernel filesystem mount point, skipping");
            continue;
        }
        if let Err(err) = mount(
            Some("none"),
            &target,
            Some(fstype),
            MsFlags::empty(),
            Some(""),
        ) {
            warn!(%path, fstype, %err, "failed to mount kernel filesystem, skipping");
        }
    }
}

fn create_directories(mount_point: &Path, directories: &[String], uid: Uid, gid: Gid) {
    for dir in directories {
        let target = jail_path(mount_point, dir);
        if let Err(err) = mkdir_owned(&target, DEFAULT_DIR_MODE, uid, gid, false) {
            warn!(directory = %dir, %err, "failed to create jail directory, skipping");
        }
    }
}

fn create_devices(mount_point: &Path, devices: &[DeviceSpec], uid: Uid, gid: Gid) {
    for dev in devices {
        let target = jail_path(mount_point, &dev.pathname);
        if let Err(err) = mkdir_owned(&target, DEFAULT_DIR_MODE, uid, gid, true) {
            warn!(pathname = %dev.pathname, %err, "failed to create device parent directory, skipping");
            continue;
        }
        if let Err(err) = mknod_owned(
            &target,
            to_node_kind(dev.kind),
            dev.major,
            dev.minor,
            dev.perm,
            uid,
            gid,
        ) {
            warn!(pathname = %dev.pathname, %err, "failed to create device node, skipping");
        }
    }
}

fn create_binds(mount_point: &Path, binds: &[BindSpec], uid: Uid, gid: Gid) -> Vec<PathBuf> {
    let mut bind_entries = Vec::new();

    for bind in binds {
        let source = Path::new(&bind.source);
        let target = jail_path(mount_point, &bind.target);

        let prepared = if source.is_dir() {
            mkdir_owned(&target, DEFAULT_DIR_MODE, uid, gid, false)
        } else {
            touch_owned(&target, uid, gid)
        };
        if let Err(err) = prepared {
            warn!(source = %bind.source, %err, "failed to prepare bind target, skipping");
            continue;
        }

        if let Err(err) = mount(
            Some(source),
            &target,
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        ) {
            warn!(source = %bind.source, target = %target.display(), %err, "bind mount failed, skipping");
            continue;
        }

        if bind.mode == BindMode::Ro {
            if let Err(err) = mount(
                Some(""),
                &target,
                Some(""),
                MsFlags::MS_REMOUNT | MsFlags::MS_BIND | MsFlags::MS_RDONLY,
                Some(""),
            ) {
                warn!(target = %target.display(), %err, "read-only remount failed after bind, leaving read-write");
            }
        }

        bind_entries.push(target);
    }

    bind_entries
}
