// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Typed configuration schema for `warden`.
//!
//! The JSON config file is treated as an external, opaque-value-producing
//! collaborator (`serde_json`); this crate's job is to turn it into validated
//! Rust types exactly once, so the jail builder and supervisor never touch a
//! raw JSON value.

pub mod capability;
mod error;
mod load;
mod schema;

pub use error::ConfigError;
pub use load::load;
pub use schema::{BindMode, BindSpec, DeviceKind, DeviceSpec, FilesystemConfig, JailConfig, StdioUri};
