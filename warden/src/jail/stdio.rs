// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jail_config::JailConfig;
use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::{chown, mkfifo, Gid, Uid};

const FIFO_PERM: u32 = 0o777;

fn mkfifo_owned(path: &Path, uid: Uid, gid: Gid) -> Result<()> {
    let mode = Mode::from_bits_truncate(FIFO_PERM as nix::sys::stat::mode_t);
    match mkfifo(path, mode) {
        Ok(()) | Err(Errno::EEXIST) => {}
        Err(e) => return Err(e).with_context(|| format!("mkfifo failed: {}", path.display())),
    }
    chown(path, Some(uid), Some(gid))
        .with_context(|| format!("chown failed: {}", path.display()))
}

/// Creates the two stdio FIFOs named by the configuration's `stdio` URI,
/// chowned to the prisoner. Pre-existing FIFOs are tolerated.
pub fn create_stdio_for_prisoner(cfg: &JailConfig, uid: Uid, gid: Gid) -> Result<(PathBuf, PathBuf)> {
    let stdin_path = cfg.stdio.instantiate(0);
    let stdout_path = cfg.stdio.instantiate(1);

    mkfifo_owned(&stdin_path, uid, gid)?;
    mkfifo_owned(&stdout_path, uid, gid)?;

    Ok((stdin_path, stdout_path))
}
