// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{
    os::unix::process::ExitStatusExt,
    process::{ExitCode, ExitStatus},
};

/// Converts [`ExitStatus`] to [`ExitCode`] following the POSIX shell
/// convention.
///
/// It panics if [`ExitStatus`] does not represent a status of an exiting
/// process (e.g. process being stopped or continued). This won't happen as
/// long as you get [`ExitStatus`] from [`std::process`] methods, or from
/// [`nix::sys::wait::waitpid`] translated through
/// [`std::os::unix::process::ExitStatusExt`].
pub fn status_to_exit_code(status: &ExitStatus) -> ExitCode {
    if let Some(code) = status.code() {
        ExitCode::from(code as u8)
    } else if let Some(signal) = status.signal() {
        ExitCode::from(128 + signal as u8)
    } else {
        panic!("ExitStatus does not represent process exit: {:?}", status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn maps_success_exit_code() -> anyhow::Result<()> {
        let status = Command::new("true").status()?;
        assert_eq!(status_to_exit_code(&status), ExitCode::SUCCESS);
        Ok(())
    }

    #[test]
    fn maps_failure_exit_code() -> anyhow::Result<()> {
        let status = Command::new("false").status()?;
        assert_eq!(status_to_exit_code(&status), ExitCode::from(1));
        Ok(())
    }
}
