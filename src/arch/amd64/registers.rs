// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! x86-64 interrupt-control primitives.
//!
//! Only the instructions the bring-up and idle paths actually issue;
//! this crate has no user-mode, syscall, or debug-register surface to
//! justify carrying MSR/CR/RFLAGS plumbing for.

/// Disable interrupts (CLI)
///
/// # Safety
///
/// This function uses inline assembly to disable interrupts.
#[inline]
pub unsafe fn x86_cli() {
    core::arch::asm!("cli", options(nomem, nostack));
}

/// Enable interrupts (STI)
///
/// # Safety
///
/// This function uses inline assembly to enable interrupts.
#[inline]
pub unsafe fn x86_sti() {
    core::arch::asm!("sti", options(nomem, nostack));
}

/// Halt the CPU
///
/// # Safety
///
/// This function uses inline assembly to halt the CPU.
#[inline]
pub unsafe fn x86_hlt() {
    core::arch::asm!("hlt", options(nomem, nostack));
}
