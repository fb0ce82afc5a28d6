// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use jail_config::JailConfig;
use nix::unistd::Pid;

use crate::user::{self, ResolvedUser};

/// Default scratch mount-point template.
pub const DEFAULT_MOUNT_TEMPLATE: &str = "/tmp/chroot-XXXXXX";

/// Everything a single run of `warden` needs, from argument parsing through
/// cleanup.
pub struct JailContext {
    pub user: Option<ResolvedUser>,
    pub home: PathBuf,
    pub shell: String,
    pub term: String,
    pub argv: Vec<String>,
    pub pid: Option<Pid>,
    pub config: JailConfig,
    pub mount_point: Option<PathBuf>,
    pub bind_entries: Vec<PathBuf>,
    pub do_attach: bool,
}

impl JailContext {
    pub fn stdin_path(&self) -> PathBuf {
        self.config.stdio.instantiate(0)
    }

    pub fn stdout_path(&self) -> PathBuf {
        self.config.stdio.instantiate(1)
    }
}

/// Builds a [`JailContext`] from CLI inputs, following the `cliutil::
/// ConfigBuilder` idiom: defaults applied up front, explicit overrides
/// layered on, validated once in `build`.
#[derive(Default)]
pub struct JailContextBuilder {
    config_path: Option<PathBuf>,
    user_name: Option<String>,
    group_name: Option<String>,
    attach: bool,
    argv: Vec<String>,
}

impl JailContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    pub fn user(mut self, name: Option<String>) -> Self {
        self.user_name = name;
        self
    }

    pub fn group(mut self, name: Option<String>) -> Self {
        self.group_name = name;
        self
    }

    pub fn attach(mut self, yes: bool) -> Self {
        self.attach = yes;
        self
    }

    pub fn argv(mut self, argv: Vec<String>) -> Self {
        self.argv = argv;
        self
    }

    pub fn build(self) -> Result<JailContext> {
        let config_path = self.config_path.context("config path is required")?;
        let config = jail_config::load(&config_path)
            .with_context(|| format!("failed to load config {}", config_path.display()))?;

        let user = match &self.user_name {
            Some(name) => Some(user::resolve_user(name, self.group_name.as_deref())?),
            None => {
                ensure!(self.attach, "-u/--user is required unless -a/--attach is set");
                None
            }
        };

        let (home, shell) = match &user {
            Some(u) => (u.home.clone(), u.shell.clone()),
            None => (PathBuf::from("/"), "/bin/sh".to_string()),
        };

        let term = std::env::var("TERM").unwrap_or_else(|_| "xterm".to_string());

        Ok(JailContext {
            user,
            home,
            shell,
            term,
            argv: self.argv,
            pid: None,
            config,
            mount_point: None,
            bind_entries: Vec::new(),
            do_attach: self.attach,
        })
    }
}

/// Mount-point templates must end in `XXXXXX` so `mkdtemp` can substitute a
/// unique suffix.
pub fn validate_mount_template(template: &Path) -> Result<()> {
    ensure!(
        template
            .file_name()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.ends_with("XXXXXX")),
        "mount point template {} must end in XXXXXX",
        template.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_is_valid() {
        assert!(validate_mount_template(Path::new(DEFAULT_MOUNT_TEMPLATE)).is_ok());
    }

    #[test]
    fn rejects_template_without_placeholder() {
        assert!(validate_mount_template(Path::new("/tmp/chroot")).is_err());
    }

    #[test]
    fn rejects_template_with_short_placeholder() {
        assert!(validate_mount_template(Path::new("/tmp/chroot-XXX")).is_err());
    }
}
