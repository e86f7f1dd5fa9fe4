// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Synchronization primitives.

pub mod spinlock;

pub use spinlock::{
    preempt_count, spin_lock, spin_try_lock, spin_unlock, SpinLock, SpinLockGuard, SpinMutex,
    SpinMutexGuard,
};
