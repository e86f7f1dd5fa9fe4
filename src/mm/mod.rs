// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Memory management: the kernel page-table builder (KMEM), the
//! page-frame database (PFDB), and the paging API built on top of both.

pub mod kmem;
pub mod paging;
pub mod pfdb;
pub mod pte;

pub use paging::AddressSpace;
pub use pfdb::{Pf, Pfdb};
