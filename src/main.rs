// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel entry point.
//!
//! Replaces the UEFI `#[entry]`/`exit_boot_services` bring-up with a BIOS/
//! ISO-boot-appropriate one: the loader contract (§6) already leaves the
//! CPU in long mode with CR3 pointing at the boot page table and
//! interrupts disabled, so there is no boot-services handoff to perform —
//! `_start` only needs to establish its own stack and hand off to Rust.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use rustux::arch::amd64::layout;
use rustux::{acpi, arch, log_setup, mm, pmap};

core::arch::global_asm!(
    ".global _start",
    "_start:",
    "mov rsp, {stack_top}",
    "and rsp, -16",
    "call {entry}",
    "2:",
    "hlt",
    "jmp 2b",
    stack_top = const layout::KERNEL_STACK_TOP,
    entry = sym rust_entry,
);

// Defined by the linker script as the first byte past the loaded kernel
// image; only its address is used, never its contents.
extern "C" {
    static _kernel_end: u8;
}

extern "C" fn rust_entry() -> ! {
    log_setup::init();
    log::info!("rustux: memory-management and interrupt-dispatch core booting");

    unsafe { arch::amd64::init() };
    log::info!("rustux: GDT/IDT/PIC bring-up complete");

    let kernel_image_end = unsafe { &_kernel_end as *const u8 as u64 };
    unsafe { pmap::init_from_loader(kernel_image_end) };
    pmap::dump();
    log::info!("rustux: pmap normalized, {} region(s)", pmap::count());

    acpi::init();
    match acpi::fadt() {
        Some(_) => log::info!("rustux: FADT located"),
        None => log::warn!("rustux: no FADT found"),
    }
    match acpi::madt_addr() {
        Some(addr) => log::info!("rustux: MADT located at {:#x}", addr),
        None => log::warn!("rustux: no MADT found"),
    }

    let mut kernel_table = mm::kmem::new_kernel_table();
    mm::kmem::kmem_init(&mut kernel_table);

    let mut pfdb = unsafe { mm::pfdb::build_from_pmap() };
    log::info!(
        "rustux: pfdb built, {} frame(s), {} available",
        pfdb.count,
        pfdb.avail
    );

    mm::paging::pagetable_activate(Some(&kernel_table));
    log::info!("rustux: kernel page table installed");

    const PAGING_SELFTEST_VADDR: u64 = 0xFFFF_8000_0010_0000;
    match mm::paging::page_alloc(&mut kernel_table, &mut pfdb, 0, PAGING_SELFTEST_VADDR, 1) {
        Ok(_) => {
            log::info!("rustux: paging self-test: page_alloc ok");
            if let Err(e) =
                mm::paging::page_free(&mut kernel_table, &mut pfdb, 0, PAGING_SELFTEST_VADDR, 1)
            {
                log::error!("rustux: paging self-test: page_free failed: {e:?}");
            } else {
                log::info!("rustux: paging self-test: page_free ok");
            }
        }
        Err(e) => log::error!("rustux: paging self-test: page_alloc failed: {e:?}"),
    }

    unsafe { rustux::arch::amd64::registers::x86_sti() };
    log::info!("rustux: interrupts enabled, idling");

    loop {
        unsafe { rustux::arch::amd64::registers::x86_hlt() };
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log::error!("panic: {info}");
    rustux::status::fatal("kernel panic")
}
