// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Fixed physical memory layout handed to the kernel by the boot loader.
//!
//! Every address below is part of the loader/kernel ABI: the loader places
//! these structures before transferring control, and the kernel core reads
//! or rebuilds them in place. Keeping them in one module means the fixed
//! layout has a single source of truth instead of being scattered as magic
//! numbers across the bring-up pipeline.

/// Base of the interrupt descriptor table (256 x 16 B entries).
pub const IDT_BASE: u64 = 0x0000_1000;
/// Size in bytes of the IDT region.
pub const IDT_SIZE: u64 = 0x1000;

/// Base of the ISR function-pointer table (256 x 8 B entries).
pub const ISR_TABLE_BASE: u64 = 0x0000_2000;
/// Size in bytes of the ISR function-pointer table.
pub const ISR_TABLE_SIZE: u64 = 0x0800;

/// Base of the 256 sixteen-byte ISR thunks (`push imm32` needs more room
/// than the `push imm8` encoding the region was originally sized for).
pub const ISR_THUNK_BASE: u64 = 0x0000_2800;
/// Size in bytes of the thunk table region.
pub const ISR_THUNK_SIZE: u64 = 0x0000_1000;

/// Base of the GDT, copied into place by the boot loader.
pub const GDT_BASE: u64 = 0x0000_3800;

/// Base of the 64-bit TSS.
pub const TSS_BASE: u64 = 0x0000_3900;

/// Base of the boot page table (PML4/PDPT/PDT/PT built by the loader).
pub const BOOT_PT_BASE: u64 = 0x0001_0000;
/// End (exclusive) of the boot page table region.
pub const BOOT_PT_END: u64 = 0x0002_0000;

/// Base of the kernel page-table scratch pool (bump-allocated interior
/// tables for [`crate::mm::kmem`]).
pub const KMEM_SCRATCH_BASE: u64 = 0x0002_0000;
/// End (exclusive) of the kernel page-table scratch pool.
pub const KMEM_SCRATCH_END: u64 = 0x0007_0000;

/// Base of the PMAP table (region count followed by the region array).
pub const PMAP_BASE: u64 = 0x0007_0000;

/// Base of the paired NMI / double-fault / machine-check IST stacks.
pub const IST_STACKS_BASE: u64 = 0x0008_A000;
/// End (exclusive) of the IST stack region.
pub const IST_STACKS_END: u64 = 0x0009_0000;
/// Size in bytes of a single IST stack.
pub const IST_STACK_SIZE: u64 = 0x0800;

/// Base of VGA MMIO, registered as [`crate::pmap::MemType::Uncached`].
pub const VGA_MMIO_BASE: u64 = 0x000A_0000;
/// Size in bytes of the VGA MMIO window.
pub const VGA_MMIO_SIZE: u64 = 0x0002_0000;

/// Base of the interrupt stack.
pub const INTERRUPT_STACK_BASE: u64 = 0x0010_0000;
/// Top (exclusive) of the interrupt stack.
pub const INTERRUPT_STACK_TOP: u64 = 0x001F_F000;

/// Base of the kernel stack.
pub const KERNEL_STACK_BASE: u64 = 0x0020_0000;
/// Top (exclusive) of the kernel stack.
pub const KERNEL_STACK_TOP: u64 = 0x0030_0000;

/// Kernel image load base.
pub const KERNEL_IMAGE_BASE: u64 = 0x0030_0000;
/// Kernel entry point.
pub const KERNEL_ENTRY: u64 = 0x0030_1000;

/// Start of the ACPI RSDP scan window covering the EBDA-adjacent range.
pub const RSDP_SCAN1_START: u64 = 0x0009_F800;
/// End (exclusive) of the first RSDP scan window.
pub const RSDP_SCAN1_END: u64 = 0x000A_0000;
/// Start of the BIOS ROM RSDP scan window.
pub const RSDP_SCAN2_START: u64 = 0x000C_0000;
/// End (exclusive) of the BIOS ROM RSDP scan window.
pub const RSDP_SCAN2_END: u64 = 0x0010_0000;

/// Physical root of the kernel's own page table, built by [`crate::mm::kmem`].
pub const KMEM_ROOT: u64 = 0x0002_0000;

/// Physical root of the boot page table, fixed by CR3 at kernel entry.
pub const BOOT_PT_ROOT: u64 = BOOT_PT_BASE;

/// Start of the 48 KiB scratch pool the ACPI walker may extend the boot
/// page table into (§4.2 contract) without ever writing outside it.
pub const ACPI_SCRATCH_BASE: u64 = 0x0001_4000;
/// End (exclusive) of the ACPI walker's boot-page-table scratch pool.
pub const ACPI_SCRATCH_END: u64 = BOOT_PT_END;

/// Virtual base where a fresh address space self-maps its interior tables,
/// chosen deep in kernel space out of the way of the identity map.
pub const ASPACE_SELFMAP_BASE: u64 = 0xFFFF_8000_0000_0000;

/// Software interrupt vector reserved for [`crate::status::fatal`].
pub const FATAL_VECTOR: u8 = 0xFF;

/// First IRQ vector (master PIC remapped offset).
pub const PIC_MASTER_OFFSET: u8 = 0x20;
/// First slave IRQ vector (slave PIC remapped offset).
pub const PIC_SLAVE_OFFSET: u8 = 0x28;

/// CPU exception vectors that push an error code and need the special
/// dispatcher (§4.5): #DF, #TS, #NP, #SS, #GP, #PF.
pub const ERROR_CODE_VECTORS: [u8; 6] = [0x08, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E];

/// NMI vector, routed to IST1.
pub const VECTOR_NMI: u8 = 0x02;
/// Double-fault vector, routed to IST2.
pub const VECTOR_DOUBLE_FAULT: u8 = 0x08;
/// Machine-check vector, routed to IST3.
pub const VECTOR_MACHINE_CHECK: u8 = 0x12;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_regions_do_not_overlap() {
        assert!(IDT_BASE + IDT_SIZE <= ISR_TABLE_BASE);
        assert!(ISR_TABLE_BASE + ISR_TABLE_SIZE <= ISR_THUNK_BASE);
        assert!(ISR_THUNK_BASE + ISR_THUNK_SIZE <= GDT_BASE);
        assert!(GDT_BASE < TSS_BASE);
        assert!(TSS_BASE + 256 <= BOOT_PT_BASE);
        assert!(BOOT_PT_BASE < BOOT_PT_END);
        assert!(BOOT_PT_END <= KMEM_SCRATCH_BASE);
        assert!(KMEM_SCRATCH_BASE < KMEM_SCRATCH_END);
        assert!(KMEM_SCRATCH_END <= PMAP_BASE);
    }

    #[test]
    fn acpi_scratch_pool_is_48_kib() {
        assert_eq!(ACPI_SCRATCH_END - ACPI_SCRATCH_BASE, 48 * 1024);
    }

    #[test]
    fn rsdp_scan_windows_match_spec() {
        assert_eq!(RSDP_SCAN1_START, 0x9F800);
        assert_eq!(RSDP_SCAN1_END, 0xA0000);
        assert_eq!(RSDP_SCAN2_START, 0xC0000);
        assert_eq!(RSDP_SCAN2_END, 0x100000);
    }
}
