// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Spinlock primitive for future multi-core use.
//!
//! None of the single-CPU bring-up paths in this crate acquire these locks;
//! mutable globals during bring-up are instead protected by strict
//! ordering or by disabling interrupts around the critical section (see
//! `isr_set`). The primitive exists so later multi-core code has a ready
//! building block.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Per-CPU counter of held preemption-disabling sections.
///
/// Incremented by [`spin_lock`]/[`spin_try_lock`] and decremented by
/// [`spin_unlock`]. Not yet consulted by a scheduler (none exists in this
/// crate), but its bookkeeping is exact so a future preemption check can
/// rely on it.
static PREEMPT_COUNT: AtomicU32 = AtomicU32::new(0);

/// A mutual-exclusion primitive backed by an atomic flag and a PAUSE-based
/// spin loop.
pub struct SpinMutex<T: ?Sized> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for SpinMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinMutex<T> {}

impl<T> SpinMutex<T> {
    /// Create a new unlocked spinlock wrapping `data`.
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SpinMutex<T> {
    /// Acquire the lock, spinning with `core::hint::spin_loop()` until free.
    pub fn lock(&self) -> SpinMutexGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
        SpinMutexGuard { lock: self }
    }

    /// Try to acquire the lock without spinning.
    pub fn try_lock(&self) -> Option<SpinMutexGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinMutexGuard { lock: self })
    }

    /// Raw pointer to the guarded data, bypassing the lock.
    ///
    /// # Safety
    /// Caller must ensure exclusive access is actually held.
    pub fn as_ptr(&self) -> *mut T {
        self.data.get()
    }

    /// Whether the lock is currently held by some holder.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// RAII guard releasing a [`SpinMutex`] on drop.
pub struct SpinMutexGuard<'a, T: ?Sized> {
    lock: &'a SpinMutex<T>,
}

impl<T: ?Sized> Deref for SpinMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// Type alias kept for call sites that prefer the shorter name.
pub type SpinLock<T> = SpinMutex<T>;
/// Type alias kept for call sites that prefer the shorter name.
pub type SpinLockGuard<'a, T> = SpinMutexGuard<'a, T>;

/// Raw lock/unlock free functions over a bare [`AtomicBool`], for call
/// sites that cannot hold a `SpinMutexGuard` across a non-lexical scope
/// (e.g. an interrupt handler installed as a bare function pointer).
///
/// Bumps [`PREEMPT_COUNT`] while held.
pub fn spin_lock(flag: &AtomicBool) {
    while flag
        .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        while flag.load(Ordering::Relaxed) {
            core::hint::spin_loop();
        }
    }
    PREEMPT_COUNT.fetch_add(1, Ordering::Relaxed);
}

/// Non-spinning attempt to set `flag`. Returns whether the lock was
/// acquired; on success bumps [`PREEMPT_COUNT`] the same as [`spin_lock`].
pub fn spin_try_lock(flag: &AtomicBool) -> bool {
    let acquired = flag
        .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_ok();
    if acquired {
        PREEMPT_COUNT.fetch_add(1, Ordering::Relaxed);
    }
    acquired
}

/// Release `flag` acquired via [`spin_lock`]/[`spin_try_lock`].
pub fn spin_unlock(flag: &AtomicBool) {
    flag.store(false, Ordering::Release);
    PREEMPT_COUNT.fetch_sub(1, Ordering::Relaxed);
}

/// Current depth of nested `spin_lock`/`spin_try_lock` holds on this CPU.
pub fn preempt_count() -> u32 {
    PREEMPT_COUNT.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spinlock_basic() {
        let lock = SpinMutex::new(5);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 6);
    }

    #[test]
    fn test_spinlock_try_lock() {
        let lock = SpinMutex::new(0);
        let guard = lock.try_lock();
        assert!(guard.is_some());
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_spinlock_is_locked() {
        let lock = SpinMutex::new(0);
        assert!(!lock.is_locked());
        let guard = lock.lock();
        assert!(lock.is_locked());
        drop(guard);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_raw_spin_functions_track_preempt_count() {
        let flag = AtomicBool::new(false);
        let before = preempt_count();
        spin_lock(&flag);
        assert_eq!(preempt_count(), before + 1);
        assert!(!spin_try_lock(&flag));
        spin_unlock(&flag);
        assert_eq!(preempt_count(), before);
    }
}
