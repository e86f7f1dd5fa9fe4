// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! x86 GDT/TSS setup.
//!
//! IDT construction lives in [`crate::arch::amd64::idt`] since it follows
//! the thunk-table + common-dispatcher design rather than per-vector Rust
//! functions; this module keeps only the GDT and TSS, built in place at
//! the fixed physical addresses the loader hands the kernel (§6).

use crate::arch::amd64::layout;

/// GDT Entry
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct GdtEntry {
    pub limit_low: u16,
    pub base_low: u16,
    pub base_mid: u8,
    pub access: u8,
    pub flags_limit_high: u8,
    pub base_high: u8,
}

/// GDT Pointer (used with lgdt instruction)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct GdtPointer {
    pub limit: u16,
    pub base: u64,
}

/// Task State Segment (TSS) for x86-64
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct TaskStateSegment {
    pub reserved0: u32,
    pub rsp0: u64,
    pub rsp1: u64,
    pub rsp2: u64,
    pub reserved1: u32,
    pub reserved2: u32,
    pub ist1: u64,
    pub ist2: u64,
    pub ist3: u64,
    pub ist4: u64,
    pub ist5: u64,
    pub ist6: u64,
    pub ist7: u64,
    pub reserved3: u16,
    pub iomap_base: u16,
}

pub const GDT_NULL: usize = 0;
pub const GDT_KERNEL_CODE: usize = 1;
pub const GDT_KERNEL_DATA: usize = 2;
pub const GDT_USER_CODE: usize = 3;
pub const GDT_USER_DATA: usize = 4;
pub const GDT_TSS_LOW: usize = 5;
pub const GDT_TSS_HIGH: usize = 6;
pub const GDT_ENTRIES: usize = 7;

pub const ACC_PRESENT: u8 = 0x80;
pub const ACC_CODE_DATA: u8 = 0x10;
pub const ACC_CODE: u8 = 0x0A;
pub const ACC_DATA: u8 = 0x02;
pub const ACC_DPL0: u8 = 0x00;
pub const ACC_DPL3: u8 = 0x60;

pub const FLAG_GRANULARITY_4K: u8 = 0x80;
pub const FLAG_SIZE_64BIT: u8 = 0x20;

impl GdtEntry {
    pub const fn null() -> Self {
        Self {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access: 0,
            flags_limit_high: 0,
            base_high: 0,
        }
    }

    pub fn set_gate(base: u64, limit: u32, access: u8, flags: u8) -> Self {
        Self {
            limit_low: limit as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access,
            flags_limit_high: ((limit >> 16) & 0x0F) as u8 | flags,
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }

    pub fn set_tss_low(base: u64, limit: u32, access: u8) -> Self {
        Self {
            limit_low: limit as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access,
            flags_limit_high: ((limit >> 16) & 0x0F) as u8,
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }

    pub fn set_tss_high(base: u64) -> Self {
        Self {
            limit_low: ((base >> 32) & 0xFFFF) as u16,
            base_low: 0,
            base_mid: 0,
            access: 0,
            flags_limit_high: ((base >> 48) as u8) & 0xFF,
            base_high: ((base >> 56) as u8) & 0xFF,
        }
    }
}

impl TaskStateSegment {
    pub const fn null() -> Self {
        Self {
            reserved0: 0,
            rsp0: 0,
            rsp1: 0,
            rsp2: 0,
            reserved1: 0,
            reserved2: 0,
            ist1: 0,
            ist2: 0,
            ist3: 0,
            ist4: 0,
            ist5: 0,
            ist6: 0,
            ist7: 0,
            reserved3: 0,
            iomap_base: 0,
        }
    }
}

fn gdt_ptr() -> *mut GdtEntry {
    layout::GDT_BASE as *mut GdtEntry
}

fn tss_ptr() -> *mut TaskStateSegment {
    layout::TSS_BASE as *mut TaskStateSegment
}

/// Build the GDT and TSS in place at their fixed physical addresses (§6)
/// and load both. The three IST slots are filled in by
/// [`crate::arch::amd64::idt::build`], which runs after this.
///
/// # Safety
/// Must run before interrupts are enabled and before any code relies on
/// the loader-provided GDT/TSS.
pub unsafe fn gdt_setup() {
    let gdt = gdt_ptr();
    core::ptr::write(gdt.add(GDT_NULL), GdtEntry::null());
    core::ptr::write(
        gdt.add(GDT_KERNEL_CODE),
        GdtEntry::set_gate(
            0,
            0xFFFFF,
            ACC_PRESENT | ACC_CODE_DATA | ACC_CODE | ACC_DPL0,
            FLAG_GRANULARITY_4K | FLAG_SIZE_64BIT,
        ),
    );
    core::ptr::write(
        gdt.add(GDT_KERNEL_DATA),
        GdtEntry::set_gate(
            0,
            0xFFFFF,
            ACC_PRESENT | ACC_CODE_DATA | ACC_DATA | ACC_DPL0,
            FLAG_GRANULARITY_4K,
        ),
    );
    core::ptr::write(
        gdt.add(GDT_USER_CODE),
        GdtEntry::set_gate(
            0,
            0xFFFFF,
            ACC_PRESENT | ACC_CODE_DATA | ACC_CODE | ACC_DPL3,
            FLAG_GRANULARITY_4K | FLAG_SIZE_64BIT,
        ),
    );
    core::ptr::write(
        gdt.add(GDT_USER_DATA),
        GdtEntry::set_gate(
            0,
            0xFFFFF,
            ACC_PRESENT | ACC_CODE_DATA | ACC_DATA | ACC_DPL3,
            FLAG_GRANULARITY_4K,
        ),
    );

    core::ptr::write(tss_ptr(), TaskStateSegment::null());
    let tss_base = layout::TSS_BASE;
    let tss_limit = core::mem::size_of::<TaskStateSegment>() as u32;
    let tss_access = ACC_PRESENT | 0x09;
    core::ptr::write(
        gdt.add(GDT_TSS_LOW),
        GdtEntry::set_tss_low(tss_base, tss_limit, tss_access),
    );
    core::ptr::write(gdt.add(GDT_TSS_HIGH), GdtEntry::set_tss_high(tss_base));

    let pointer = GdtPointer {
        limit: ((core::mem::size_of::<GdtEntry>() * GDT_ENTRIES) - 1) as u16,
        base: layout::GDT_BASE,
    };
    gdt_load(&pointer);
    tss_load((GDT_TSS_LOW * 8) as u16);
}

/// Selector for ring 0 code, used by every IDT descriptor (§4.5).
pub const fn kernel_code_selector() -> u16 {
    (GDT_KERNEL_CODE * 8) as u16
}

/// Reference to the TSS at its fixed address, for writing IST stack
/// pointers.
///
/// # Safety
/// Caller must ensure [`gdt_setup`] has already run.
pub unsafe fn tss() -> &'static mut TaskStateSegment {
    &mut *tss_ptr()
}

/// # Safety
/// Must be called with a valid GDT pointer.
#[inline]
pub unsafe fn gdt_load(gdt_ptr: &GdtPointer) {
    core::arch::asm!("lgdt [{}]", in(reg) gdt_ptr, options(nostack));
}

/// # Safety
/// Must be called with a valid TSS selector.
#[inline]
pub unsafe fn tss_load(selector: u16) {
    core::arch::asm!("ltr {0:x}", in(reg) selector, options(nostack));
}
