// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use thiserror::Error;

/// Errors surfaced while loading and validating a jail configuration file.
///
/// All variants are fatal before any mount happens; `warden` wraps them into
/// `anyhow::Error` at the point it consumes `jail_config::load`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is {size} bytes, exceeding the {limit}-byte limit")]
    TooLarge {
        path: String,
        size: u64,
        limit: u64,
    },

    #[error("failed to parse config file {path} as JSON")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown or malformed stdio URI: {0:?} (expected fifo://<template-with-one-%d-slot>)")]
    InvalidStdioUri(String),

    #[error("unknown capability name: {0:?}")]
    UnknownCapability(String),

    #[error("malformed device spec: {0:?}")]
    InvalidDeviceSpec(String),

    #[error("malformed bind spec: {0:?}")]
    InvalidBindSpec(String),

    #[error("invalid permission bits {0:?}")]
    InvalidPermission(String),
}
