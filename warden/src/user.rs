// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use nix::unistd::{Gid, Uid};

/// The prisoner identity resolved from the passwd/group databases: uid,
/// gid, name, home directory, and login shell.
#[derive(Debug, Clone)]
pub struct ResolvedUser {
    pub uid: Uid,
    pub gid: Gid,
    pub name: String,
    pub home: PathBuf,
    pub shell: String,
}

/// Resolves `user_name` via the passwd database, optionally overriding the
/// gid with `group_name` resolved via the group database.
pub fn resolve_user(user_name: &str, group_name: Option<&str>) -> Result<ResolvedUser> {
    let user = users::get_user_by_name(user_name)
        .with_context(|| format!("no such user: {user_name:?}"))?;

    let gid = match group_name {
        Some(group_name) => {
            let group = users::get_group_by_name(group_name)
                .with_context(|| format!("no such group: {group_name:?}"))?;
            Gid::from_raw(group.gid())
        }
        None => Gid::from_raw(user.primary_group_id()),
    };

    Ok(ResolvedUser {
        uid: Uid::from_raw(user.uid()),
        gid,
        name: user_name.to_string(),
        home: user.home_dir().to_path_buf(),
        shell: user.shell().to_string_lossy().into_owned(),
    })
}
