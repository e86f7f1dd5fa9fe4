// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Common and special ISR dispatchers (§4.5).
//!
//! Hand-written in assembly: the register-preservation ABI here is a
//! binding contract, and the compiler's own `extern "x86-interrupt"`
//! prologue does not guarantee the exact layout the thunk table assumes.
//! Follows the hand-assembled privileged-mode style of `mexec`/
//! `bootstrap16` rather than the `x86-interrupt` demo handlers in
//! `main.rs`.

use crate::arch::amd64::idt::InterruptContext;

/// The interrupt frame as laid out by the dispatcher's pushes, in the
/// order §4.5 describes: GP regs, error code, vector, then the
/// CPU-pushed RIP/CS/RFLAGS/RSP/SS. `rsp` here is the value the CPU
/// pushed in the exception frame, not a second copy of the live stack
/// pointer.
#[no_mangle]
extern "C" fn rustux_dispatch_isr(ctx: *mut InterruptContext) {
    unsafe { crate::arch::amd64::idt::dispatch(&mut *ctx) };
}

core::arch::global_asm!(
    ".global rustux_special_dispatch",
    ".global rustux_common_dispatch",
    "rustux_special_dispatch:",
    // CPU pushed [error][vector is not yet present]; the thunk has
    // already pushed [vector] on top of that, giving top=vector,
    // next=error. Swap so the layout reads top=error, next=vector,
    // matching the common path below.
    "pop r15",
    "pop r14",
    "push r15",
    "push r14",
    "jmp 2f",
    "rustux_common_dispatch:",
    "push 0", // dummy error code: thunk already pushed the vector
    "2:",
    "cld",
    "push rax",
    "push rbx",
    "push rcx",
    "push rdx",
    "push rsi",
    "push rdi",
    "push rbp",
    "push r8",
    "push r9",
    "push r10",
    "push r11",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "sub rsp, 16",
    "stmxcsr [rsp]",
    "mov rdi, rsp",
    "add rdi, 16",
    "call {dispatch}",
    "ldmxcsr [rsp]",
    "add rsp, 16",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop r11",
    "pop r10",
    "pop r9",
    "pop r8",
    "pop rbp",
    "pop rdi",
    "pop rsi",
    "pop rdx",
    "pop rcx",
    "pop rbx",
    "pop rax",
    "add rsp, 16", // drop vector and error code
    "iretq",
    dispatch = sym rustux_dispatch_isr,
);

extern "C" {
    /// Entry jumped to by every thunk for a non-error-code vector.
    pub fn rustux_common_dispatch();
    /// Entry jumped to by every thunk for an error-code vector.
    pub fn rustux_special_dispatch();
}
