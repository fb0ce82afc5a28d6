// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

mod owned;
mod remove;
mod tempdir;

pub use owned::*;
pub use remove::*;
pub use tempdir::*;
