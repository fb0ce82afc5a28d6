// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::{ArgAction, Parser};

/// Builds a single-process confinement ("jail") for a target program: a
/// scratch rootfs on tmpfs, device nodes, bind mounts, a pseudo-terminal
/// attached child with reduced capabilities, and a FIFO-based I/O bridge an
/// operator can attach to.
#[derive(Parser, Debug)]
#[command(
    name = "warden",
    disable_version_flag = true,
    version = concat!("v", env!("CARGO_PKG_VERSION"))
)]
pub struct Cli {
    /// Configuration file path (JSON).
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: PathBuf,

    /// User name to resolve via the passwd database. Required unless `-a`.
    #[arg(short = 'u', long = "user", value_name = "NAME", required_unless_present = "attach")]
    pub user: Option<String>,

    /// Group name to resolve via the group database, overriding the user's
    /// primary group.
    #[arg(short = 'g', long = "group", value_name = "NAME")]
    pub group: Option<String>,

    /// Attach-only mode: skip jail construction and spawn, run only the
    /// visitation loop against the FIFOs named by the config's `stdio` URI.
    #[arg(short = 'a', long = "attach")]
    pub attach: bool,

    /// Print version and exit.
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: (),

    /// Absolute path to the prisoner program, followed by its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub argv: Vec<String>,
}

impl Cli {
    /// Validates invariants clap's declarative surface can't express:
    /// non-attach runs need a non-empty argv whose first element is an
    /// absolute path.
    pub fn validate(&self) -> Result<()> {
        if self.attach {
            return Ok(());
        }
        ensure!(!self.argv.is_empty(), "no program specified to run in the jail");
        ensure!(
            self.argv[0].starts_with('/'),
            "program path {:?} must be absolute",
            self.argv[0]
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(attach: bool, argv: Vec<&str>) -> Cli {
        Cli {
            config: PathBuf::from("/etc/warden.json"),
            user: Some("prisoner".to_string()),
            group: None,
            attach,
            version: (),
            argv: argv.into_iter().map(str::to_string).collect(),
        }
    }

    #[test]
    fn validate_rejects_empty_argv() {
        assert!(cli(false, vec![]).validate().is_err());
    }

    #[test]
    fn validate_rejects_relative_program_path() {
        assert!(cli(false, vec!["bin/sh"]).validate().is_err());
    }

    #[test]
    fn validate_accepts_absolute_program_path() {
        assert!(cli(false, vec!["/bin/sh", "-c", "true"]).validate().is_ok());
    }

    #[test]
    fn validate_skips_argv_checks_in_attach_mode() {
        assert!(cli(true, vec![]).validate().is_ok());
    }
}
