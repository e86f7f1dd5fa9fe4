// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! amd64-specific bring-up: GDT/TSS, IDT/ISR dispatch, the 8259 PIC, and
//! the fixed physical layout the loader hands the kernel.

pub mod descriptor;
pub mod dispatch;
pub mod idt;
pub mod ioport;
pub mod layout;
pub mod mmu;
pub mod pic;
pub mod registers;

/// Bring up the amd64 interrupt/descriptor machinery in the order §4.5
/// and §6 require: GDT/TSS first (the IDT's selectors and the IST stack
/// pointers both depend on it), then the thunk table, IDT, and PIC
/// remap, all still with interrupts disabled.
///
/// # Safety
/// Must run exactly once, early in kernel entry, with CR3 already
/// pointing at the loader's boot page table and interrupts disabled.
pub unsafe fn init() {
    descriptor::gdt_setup();
    idt::init();
}
