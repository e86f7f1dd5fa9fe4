// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Architecture-specific code, selected by Cargo feature.
//!
//! Only `amd64` is implemented; `arm64`/`riscv64` are feature-gated stubs
//! this crate's Non-goals exclude.

#[cfg(feature = "amd64")]
pub mod amd64;
