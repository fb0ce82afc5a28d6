// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::path::Path;

use crate::error::ConfigError;
use crate::schema::{JailConfig, RawConfig};

/// Config files larger than this are rejected outright. Deliberately tight —
/// a config file describing a jail has no business approaching this size.
const SIZE_LIMIT: u64 = libc::BUFSIZ as u64 - 1;

/// Reads and validates a jail configuration file.
///
/// Enforces the [`SIZE_LIMIT`] before attempting to parse, then converts the
/// raw JSON into a fully typed, validated [`JailConfig`]. No mount, mkdir, or
/// capability operation has happened by the time this returns `Ok`.
pub fn load(path: &Path) -> Result<JailConfig, ConfigError> {
    let metadata = std::fs::metadata(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if metadata.len() > SIZE_LIMIT {
        return Err(ConfigError::TooLarge {
            path: path.display().to_string(),
            size: metadata.len(),
            limit: SIZE_LIMIT,
        });
    }

    let contents = std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let raw: RawConfig =
        serde_json::from_slice(&contents).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })?;

    JailConfig::try_from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f
    }

    #[test]
    fn loads_minimal_config() {
        let f = write_tmp(
            br#"{
                "stdio": "fifo:///tmp/j.%d",
                "keep_capability": [],
                "filesystem": {"devtmpfs": false, "procfs": false, "sysfs": false},
                "bind": ["/bin", "/lib:/lib,ro"]
            }"#,
        );
        let cfg = load(f.path()).expect("config should load");
        assert_eq!(cfg.bind.len(), 2);
        assert_eq!(cfg.bind[0].source, "/bin");
        assert_eq!(cfg.bind[0].target, "/bin");
    }

    #[test]
    fn rejects_unknown_capability() {
        let f = write_tmp(
            br#"{
                "stdio": "fifo:///tmp/j.%d",
                "keep_capability": ["CAP_NOT_REAL"],
                "filesystem": {"devtmpfs": false, "procfs": false, "sysfs": false}
            }"#,
        );
        assert!(matches!(
            load(f.path()),
            Err(ConfigError::UnknownCapability(_))
        ));
    }

    #[test]
    fn rejects_oversized_file() {
        let huge = vec![b' '; libc::BUFSIZ as usize + 16];
        let f = write_tmp(&huge);
        assert!(matches!(load(f.path()), Err(ConfigError::TooLarge { .. })));
    }

    #[test]
    fn rejects_bad_stdio_scheme() {
        let f = write_tmp(
            br#"{
                "stdio": "file:///tmp/x",
                "keep_capability": [],
                "filesystem": {"devtmpfs": false, "procfs": false, "sysfs": false}
            }"#,
        );
        assert!(matches!(load(f.path()), Err(ConfigError::InvalidStdioUri(_))));
    }

    #[test]
    fn rejects_missing_keep_capability() {
        let f = write_tmp(
            br#"{
                "stdio": "fifo:///tmp/j.%d",
                "filesystem": {"devtmpfs": false, "procfs": false, "sysfs": false}
            }"#,
        );
        assert!(matches!(load(f.path()), Err(ConfigError::Json { .. })));
    }
}
