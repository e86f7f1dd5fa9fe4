// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ACPI table walker: locates the RSDP, walks XSDT/RSDT, extends the boot
//! page table on demand to map each descendant table, and dispatches
//! FADT/MADT/MCFG to their parsers (§4.2).

use crate::acpi::fadt::{self, Fadt};
use crate::acpi::madt::{self, Madt};
use crate::acpi::mcfg;
use crate::acpi::rsdp::{self, verify_rsdp_v2_checksum, Rsdp, RsdpV2};
use crate::acpi::rsdt::SdtEntries;
use crate::acpi::sdt::SdtHeader;
use crate::arch::amd64::layout;
use crate::mm::paging::{self, AddressSpace};
use crate::mm::pte;
use crate::pmap::{self, MemType};
use crate::status::{fatal, RxStatus};

/// Singletons recorded while walking descendant tables (§4.2 step 4).
struct AcpiTables {
    fadt: Option<Fadt>,
    madt_addr: Option<u64>,
}

static mut TABLES: AcpiTables = AcpiTables {
    fadt: None,
    madt_addr: None,
};

/// Maximum number of descendant tables the walker buffers before acting
/// on them. No real firmware carries anywhere near this many top-level
/// ACPI tables; this bound exists only to avoid an allocator this early
/// in bring-up.
const MAX_DESCENDANTS: usize = 64;

/// Boot page table handle used purely as the walker's bump-allocator
/// scratch pool (§4.2 contract: never write outside `[vnext, vterm)`).
fn boot_table() -> AddressSpace {
    AddressSpace {
        proot: layout::BOOT_PT_ROOT,
        vroot: layout::ACPI_SCRATCH_BASE,
        vnext: layout::ACPI_SCRATCH_BASE,
        vterm: layout::ACPI_SCRATCH_END,
    }
}

/// Walk RSDP -> XSDT/RSDT -> descendant tables, mapping each one through
/// the boot page table and recording FADT/MADT/MCFG. `fatal`s if no
/// RSDP or root table pointer can be found (§4.2 "Failures").
pub fn init() {
    let rsdp = rsdp::find_rsdp().unwrap_or_else(|| fatal("acpi: no RSDP found"));
    let mut bt = boot_table();

    let (root_addr, wide) = root_table_addr(rsdp);
    if root_addr == 0 {
        fatal("acpi: no XSDT/RSDT pointer in RSDP");
    }

    map_table(&mut bt, root_addr);

    let mut descendants = [0u64; MAX_DESCENDANTS];
    let mut n = 0usize;
    for addr in unsafe { SdtEntries::new(root_addr, wide) } {
        if n >= MAX_DESCENDANTS {
            fatal("acpi: more descendant tables than the walker's bounded buffer");
        }
        descendants[n] = addr;
        n += 1;
    }

    for &addr in &descendants[..n] {
        map_table(&mut bt, addr);
        dispatch(addr);
    }

    mark_apic_pages_uncached();
}

fn root_table_addr(rsdp: &Rsdp) -> (u64, bool) {
    if rsdp.version() >= 2 {
        let rsdp_v2 = unsafe { &*(rsdp as *const Rsdp as *const RsdpV2) };
        if !verify_rsdp_v2_checksum(rsdp_v2) {
            fatal("acpi: RSDP v2 extended checksum mismatch");
        }
        let xsdt = rsdp_v2.xsdt_physical_address;
        if xsdt != 0 {
            return (xsdt, true);
        }
    }
    (rsdp.rsdt_physical_address as u64, false)
}

/// Ensure `[addr, addr + length)` is mapped in the boot page table, where
/// `length` is read from the header once the header itself is mapped
/// (§4.2 step 3), then register the table's pages as Acpi in the PMAP.
fn map_table(bt: &mut AddressSpace, addr: u64) {
    map_range(bt, addr, core::mem::size_of::<SdtHeader>() as u64);
    let header = unsafe { SdtHeader::read(addr) };
    map_range(bt, addr, header.length as u64);

    let aligned_start = addr & !0xFFF;
    let aligned_end = (addr + header.length as u64 + 0xFFF) & !0xFFF;
    pmap::add(aligned_start, aligned_end - aligned_start, MemType::Acpi);
}

fn map_range(bt: &mut AddressSpace, addr: u64, length: u64) {
    let start = addr & !0xFFF;
    let end = (addr + length + 0xFFF) & !0xFFF;
    let mut page = start;
    while page < end {
        match paging::add_pte(bt, page, page, pte::PRESENT | pte::RW | pte::GLOBAL) {
            Ok(()) | Err(RxStatus::ErrAccessDenied) => {}
            Err(_) => fatal("acpi: boot page table scratch pool exhausted"),
        }
        page += 0x1000;
    }
}

fn dispatch(addr: u64) {
    let header = unsafe { SdtHeader::read(addr) };
    let signature = header.signature;
    if signature == *fadt::FADT_SIGNATURE {
        unsafe { TABLES.fadt = Some(Fadt::from_table(addr)) };
    } else if signature == *madt::MADT_SIGNATURE {
        unsafe { TABLES.madt_addr = Some(addr) };
    } else if signature == *mcfg::MCFG_SIGNATURE {
        // MCFG needs no cached state beyond its address; a PCI walker
        // re-reads it on demand via `mcfg::next_mcfg_addr`.
    } else {
        log::debug!(
            "acpi: unrecognized table signature {:?}, skipping",
            core::str::from_utf8(&signature).unwrap_or("????")
        );
    }
}

/// For the local APIC and every I/O APIC entry in MADT, register the
/// containing 4 KiB page as Uncached in PMAP (§4.2 step 5).
fn mark_apic_pages_uncached() {
    let Some(madt_addr) = (unsafe { TABLES.madt_addr }) else {
        return;
    };
    let madt = unsafe { Madt::from_table(madt_addr) };
    if madt.is_truncated() {
        fatal("acpi: corrupt MADT");
    }
    pmap::add((madt.local_apic_address as u64) & !0xFFF, 0x1000, MemType::Uncached);
    for ioapic in madt.next_io_apic() {
        pmap::add((ioapic.address as u64) & !0xFFF, 0x1000, MemType::Uncached);
    }
}

/// The cached MADT table address, if the walk found one.
pub fn madt_addr() -> Option<u64> {
    unsafe { TABLES.madt_addr }
}

/// The cached FADT, if the walk found one.
pub fn fadt() -> Option<Fadt> {
    unsafe { TABLES.fadt }
}
