// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::capability;
use crate::error::ConfigError;

/// Which kernel filesystems `build_rootfs` should mount inside the jail.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FilesystemConfig {
    #[serde(default)]
    pub devtmpfs: bool,
    #[serde(default)]
    pub procfs: bool,
    #[serde(default)]
    pub sysfs: bool,
}

/// The URI naming the two FIFO stdio endpoints: `fifo://<template>` where
/// `<template>` contains exactly one `%d` slot, instantiated with `0` for
/// stdin and `1` for stdout.
#[derive(Debug, Clone)]
pub struct StdioUri {
    template: String,
}

impl StdioUri {
    const SCHEME_PREFIX: &'static str = "fifo://";
    const SLOT: &'static str = "%d";

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let template = raw
            .strip_prefix(Self::SCHEME_PREFIX)
            .ok_or_else(|| ConfigError::InvalidStdioUri(raw.to_string()))?;
        if template.matches(Self::SLOT).count() != 1 {
            return Err(ConfigError::InvalidStdioUri(raw.to_string()));
        }
        Ok(Self {
            template: template.to_string(),
        })
    }

    /// Instantiates the template's `%d` slot with `slot` (`0` for stdin, `1`
    /// for stdout).
    pub fn instantiate(&self, slot: u32) -> PathBuf {
        PathBuf::from(self.template.replacen(Self::SLOT, &slot.to_string(), 1))
    }
}

/// Device-node type. The literal string `"char"` selects a character
/// device; everything else (including `"block"`) falls back to a regular
/// file. Block devices cannot be declared. See DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Char,
    Regular,
}

impl DeviceKind {
    fn from_type_str(s: &str) -> Self {
        if s == "char" {
            DeviceKind::Char
        } else {
            DeviceKind::Regular
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceSpec {
    pub pathname: String,
    pub kind: DeviceKind,
    pub major: u64,
    pub minor: u64,
    pub perm: u32,
}

fn parse_octal_perm(s: &str) -> Result<u32, ConfigError> {
    u32::from_str_radix(s.trim(), 8).map_err(|_| ConfigError::InvalidPermission(s.to_string()))
}

impl DeviceSpec {
    /// Parses the string form `"<pathname>,<type>,<major>,<minor>,<perm>"`,
    /// split from the right on the last four commas so a pathname containing
    /// commas is still handled correctly.
    fn from_str_form(raw: &str) -> Result<Self, ConfigError> {
        let mut parts: Vec<&str> = raw.rsplitn(5, ',').collect();
        if parts.len() != 5 {
            return Err(ConfigError::InvalidDeviceSpec(raw.to_string()));
        }
        parts.reverse();
        let (pathname, kind, major, minor, perm) =
            (parts[0], parts[1], parts[2], parts[3], parts[4]);

        let major: u64 = major
            .parse()
            .map_err(|_| ConfigError::InvalidDeviceSpec(raw.to_string()))?;
        let minor: u64 = minor
            .parse()
            .map_err(|_| ConfigError::InvalidDeviceSpec(raw.to_string()))?;

        Ok(DeviceSpec {
            pathname: pathname.to_string(),
            kind: DeviceKind::from_type_str(kind),
            major,
            minor,
            perm: parse_octal_perm(perm)?,
        })
    }

    fn from_json(value: &serde_json::Value) -> Result<Self, ConfigError> {
        match value {
            serde_json::Value::String(s) => Self::from_str_form(s),
            serde_json::Value::Object(map) => {
                let err = || ConfigError::InvalidDeviceSpec(value.to_string());
                let pathname = map
                    .get("pathname")
                    .and_then(|v| v.as_str())
                    .ok_or_else(err)?
                    .to_string();
                let kind = map
                    .get("type")
                    .and_then(|v| v.as_str())
                    .map(DeviceKind::from_type_str)
                    .ok_or_else(err)?;
                let major = map.get("major").and_then(|v| v.as_u64()).ok_or_else(err)?;
                let minor = map.get("minor").and_then(|v| v.as_u64()).ok_or_else(err)?;
                let perm_str = map.get("perm").and_then(|v| v.as_str()).ok_or_else(err)?;
                Ok(DeviceSpec {
                    pathname,
                    kind,
                    major,
                    minor,
                    perm: parse_octal_perm(perm_str)?,
                })
            }
            other => Err(ConfigError::InvalidDeviceSpec(other.to_string())),
        }
    }
}

/// Whether a bind mount is remounted read-only after the bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    Ro,
    Rw,
}

impl BindMode {
    fn from_str(s: &str) -> Self {
        if s == "ro" {
            BindMode::Ro
        } else {
            BindMode::Rw
        }
    }
}

#[derive(Debug, Clone)]
pub struct BindSpec {
    pub source: String,
    pub target: String,
    pub mode: BindMode,
}

impl BindSpec {
    /// Parses the string form `"<source>[:<target>][,<mode>]"`: splits first
    /// on `,` to peel off an optional mode suffix (default `"ro"`), then
    /// splits the remainder on `:` to separate source and target (default
    /// target is the source).
    fn from_str_form(raw: &str) -> Result<Self, ConfigError> {
        if raw.is_empty() {
            return Err(ConfigError::InvalidBindSpec(raw.to_string()));
        }
        let (main, mode) = match raw.split_once(',') {
            Some((main, mode)) => (main, mode),
            None => (raw, "ro"),
        };
        let (source, target) = match main.split_once(':') {
            Some((source, target)) => (source.to_string(), target.to_string()),
            None => (main.to_string(), main.to_string()),
        };
        Ok(BindSpec {
            source,
            target,
            mode: BindMode::from_str(mode),
        })
    }

    fn from_json(value: &serde_json::Value) -> Result<Self, ConfigError> {
        match value {
            serde_json::Value::String(s) => Self::from_str_form(s),
            serde_json::Value::Object(map) => {
                let err = || ConfigError::InvalidBindSpec(value.to_string());
                let source = map
                    .get("source")
                    .and_then(|v| v.as_str())
                    .ok_or_else(err)?
                    .to_string();
                let target = map
                    .get("target")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&source)
                    .to_string();
                let mode = map
                    .get("mode")
                    .and_then(|v| v.as_str())
                    .map(BindMode::from_str)
                    .unwrap_or(BindMode::Ro);
                Ok(BindSpec {
                    source,
                    target,
                    mode,
                })
            }
            other => Err(ConfigError::InvalidBindSpec(other.to_string())),
        }
    }
}

/// The raw JSON shape, deserialized directly by `serde` where the schema is
/// unambiguous. `device` and `bind` stay as `serde_json::Value` here because
/// each element may be either a string or a mapping; [`JailConfig::try_from`]
/// resolves that polymorphism once, up front, so every other part of the
/// crate sees plain typed records.
#[derive(Debug, Deserialize)]
pub(crate) struct RawConfig {
    pub stdio: String,
    pub keep_capability: Vec<String>,
    #[serde(default)]
    pub filesystem: FilesystemConfig,
    #[serde(default)]
    pub directory: Vec<String>,
    #[serde(default)]
    pub device: Vec<serde_json::Value>,
    #[serde(default)]
    pub bind: Vec<serde_json::Value>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// The fully validated jail configuration. Every sub-builder in
/// `warden::jail` consumes this, never raw JSON.
#[derive(Debug, Clone)]
pub struct JailConfig {
    pub stdio: StdioUri,
    pub keep_capability: Vec<String>,
    pub filesystem: FilesystemConfig,
    pub directory: Vec<String>,
    pub device: Vec<DeviceSpec>,
    pub bind: Vec<BindSpec>,
    pub environment: BTreeMap<String, String>,
}

impl TryFrom<RawConfig> for JailConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, ConfigError> {
        let stdio = StdioUri::parse(&raw.stdio)?;

        for name in &raw.keep_capability {
            if capability::capability_number(name).is_none() {
                return Err(ConfigError::UnknownCapability(name.clone()));
            }
        }

        let device = raw
            .device
            .iter()
            .map(DeviceSpec::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        let bind = raw
            .bind
            .iter()
            .map(BindSpec::from_json)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(JailConfig {
            stdio,
            keep_capability: raw.keep_capability,
            filesystem: raw.filesystem,
            directory: raw.directory,
            device,
            bind,
            environment: raw.environment,
        })
    }
}
