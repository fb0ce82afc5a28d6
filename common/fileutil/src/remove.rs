// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};

/// Removes a directory tree, restoring write/execute permissions on any
/// entry that would otherwise block the removal.
///
/// [`std::fs::remove_dir_all`] gives up as soon as it hits a directory or
/// file it cannot traverse or unlink, which is common for trees built by
/// jail setup (e.g. directories chmodded to `0` for a test, or owned by a
/// different uid under a bind mount). This walks the tree first, loosening
/// permissions everywhere, and only then removes it.
pub fn remove_dir_all_with_chmod(dir: &Path) -> Result<()> {
    restore_permissions(dir)
        .with_context(|| format!("failed to restore permissions under {}", dir.display()))?;
    fs::remove_dir_all(dir).with_context(|| format!("failed to remove {}", dir.display()))
}

/// Removes a single file, restoring write permission on its parent
/// directory first if needed.
pub fn remove_file_with_chmod(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        make_writable(parent)?;
    }
    fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))
}

fn restore_permissions(dir: &Path) -> Result<()> {
    make_writable(dir)?;

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        // The directory may already be gone, or never existed; nothing to do.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).context(format!("failed to read {}", dir.display())),
    };

    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            restore_permissions(&entry.path())?;
        } else {
            make_writable(&entry.path())?;
        }
    }
    Ok(())
}

fn make_writable(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).context(format!("failed to stat {}", path.display())),
    };
    // Symlinks have no permissions of their own to fix up.
    if metadata.is_symlink() {
        return Ok(());
    }
    let mode = metadata.permissions().mode();
    let wanted = mode | 0o700;
    if wanted != mode {
        fs::set_permissions(path, PermissionsExt::from_mode(wanted))
            .with_context(|| format!("failed to chmod {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::{create_dir, set_permissions, File};

    use super::*;
    use crate::SafeTempDir;

    #[test]
    fn removes_readonly_dir() -> Result<()> {
        let temp_dir = SafeTempDir::new()?;
        let bad_dir = temp_dir.path().join("bad");
        create_dir(&bad_dir)?;
        File::create(bad_dir.join("file"))?;
        set_permissions(&bad_dir, PermissionsExt::from_mode(0o0))?;

        remove_dir_all_with_chmod(&bad_dir)?;

        assert!(!bad_dir.try_exists()?);
        Ok(())
    }

    #[test]
    fn removes_plain_dir() -> Result<()> {
        let temp_dir = SafeTempDir::new()?;
        let dir = temp_dir.path().join("plain");
        create_dir(&dir)?;
        File::create(dir.join("file"))?;

        remove_dir_all_with_chmod(&dir)?;

        assert!(!dir.try_exists()?);
        Ok(())
    }
}
