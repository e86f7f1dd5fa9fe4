// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Paging API: per-address-space create/destroy/activate and range
//! alloc/free, built on top of [`crate::mm::pfdb`] and [`crate::mm::kmem`]
//! (§4.4).

use crate::arch::amd64::mmu;
use crate::mm::pte::{self, Table};
use crate::status::{RxResult, RxStatus};
use crate::sync::SpinMutex;

/// Physical address of the PML4 currently loaded in CR3, or `None` for
/// the kernel table. Updated only by [`pagetable_activate`].
static ACTIVE: SpinMutex<Option<u64>> = SpinMutex::new(None);

/// An address space handle: the physical root of its PML4 plus the bump
/// allocator bounds for its self-mapped interior tables (§3).
///
/// Invariant: `vroot <= vnext <= vterm`; `[vroot, vnext)` always holds
/// this address space's own interior page-table pages, self-mapped so
/// they are reachable without deriving a physical-to-virtual offset.
#[derive(Debug, Clone, Copy)]
pub struct AddressSpace {
    pub proot: u64,
    pub vroot: u64,
    pub vnext: u64,
    pub vterm: u64,
}

fn table_indices(vaddr: u64) -> [usize; 4] {
    [
        ((vaddr >> 39) & 0x1FF) as usize,
        ((vaddr >> 30) & 0x1FF) as usize,
        ((vaddr >> 21) & 0x1FF) as usize,
        ((vaddr >> 12) & 0x1FF) as usize,
    ]
}

fn read_entry(table: u64, index: usize) -> u64 {
    unsafe { (*(table as *const Table)).entries[index] }
}

fn write_entry(table: u64, index: usize, value: u64) {
    unsafe {
        (*(table as *mut Table)).entries[index] = value;
    }
}

/// Upsert a 4 KiB mapping `vaddr -> paddr` into `pt`, allocating any
/// missing interior table on demand (§4.4).
///
/// Newly allocated interior pages are self-mapped into `pt`'s own
/// address range at `pt.vnext`, which is then advanced — this keeps
/// every interior table reachable by a known virtual address. The
/// recursion this induces is bounded at 3 (at most three interior pages
/// can be freshly allocated for a single leaf insert), so it is
/// flattened into a loop here per the Open Question in §9.
pub fn add_pte(pt: &mut AddressSpace, vaddr: u64, paddr: u64, flags: u64) -> RxResult<()> {
    let idx = table_indices(vaddr);
    let mut table = pt.proot;
    let mut newly_allocated: [Option<u64>; 3] = [None; 3];

    for level in 0..3 {
        let entry = read_entry(table, idx[level]);
        if pte::is_present(entry) {
            if pte::is_system(entry) {
                return Err(RxStatus::ErrAccessDenied);
            }
            table = pte::phys_of(entry);
            continue;
        }
        let child = alloc_interior(pt)?;
        write_entry(
            table,
            idx[level],
            pte::make_entry(child, pte::PRESENT | pte::RW | pte::GLOBAL),
        );
        newly_allocated[level] = Some(child);
        table = child;
    }

    let leaf = read_entry(table, idx[3]);
    if pte::is_present(leaf) && pte::is_system(leaf) {
        return Err(RxStatus::ErrAccessDenied);
    }
    write_entry(table, idx[3], pte::make_entry(paddr, flags));

    for child in newly_allocated.into_iter().flatten() {
        let selfmap_vaddr = pt.vnext;
        pt.vnext += 4096;
        // Self-map at a freshly bumped address; at most 3 such mappings
        // per add_pte call, each of which allocates no further interior
        // pages because pt.vnext always lands inside already-mapped
        // scratch range reserved at pagetable_create time.
        add_pte_leaf_only(pt, selfmap_vaddr, child, pte::PRESENT | pte::RW | pte::GLOBAL)?;
    }
    Ok(())
}

/// Internal helper for the self-mapping step: identical to `add_pte` but
/// does not recurse into further self-mapping, since the scratch region
/// `[vroot, vterm)` is pre-mapped by `pagetable_create`.
fn add_pte_leaf_only(pt: &mut AddressSpace, vaddr: u64, paddr: u64, flags: u64) -> RxResult<()> {
    let idx = table_indices(vaddr);
    let mut table = pt.proot;
    for level in 0..3 {
        let entry = read_entry(table, idx[level]);
        if !pte::is_present(entry) {
            let child = alloc_interior(pt)?;
            write_entry(
                table,
                idx[level],
                pte::make_entry(child, pte::PRESENT | pte::RW | pte::GLOBAL),
            );
            table = child;
        } else {
            table = pte::phys_of(entry);
        }
    }
    write_entry(table, idx[3], pte::make_entry(paddr, flags));
    Ok(())
}

fn alloc_interior(pt: &mut AddressSpace) -> RxResult<u64> {
    if pt.vnext + 4096 > pt.vterm {
        return Err(RxStatus::ErrNoMemory);
    }
    let addr = pt.vnext;
    pt.vnext += 4096;
    unsafe {
        (*(addr as *mut Table)).entries = [0u64; pte::ENTRIES_PER_TABLE];
    }
    Ok(addr)
}

/// Clear the leaf mapping for `vaddr`, returning the physical address
/// that was mapped there. Invalidates the TLB entry if `pt` is active.
pub fn remove_pte(pt: &AddressSpace, vaddr: u64) -> RxResult<u64> {
    let idx = table_indices(vaddr);
    let mut table = pt.proot;
    for level in 0..3 {
        let entry = read_entry(table, idx[level]);
        if !pte::is_present(entry) {
            return Err(RxStatus::ErrNotFound);
        }
        table = pte::phys_of(entry);
    }
    let entry = read_entry(table, idx[3]);
    if !pte::is_present(entry) {
        return Err(RxStatus::ErrNotFound);
    }
    write_entry(table, idx[3], 0);
    if is_active(pt) {
        unsafe { mmu::invlpg(vaddr) };
    }
    Ok(pte::phys_of(entry))
}

fn is_active(pt: &AddressSpace) -> bool {
    *ACTIVE.lock() == Some(pt.proot)
}

/// Allocate a fresh root page for a new address space spanning `size`
/// bytes of self-mapped interior-table scratch starting at `vaddr`, and
/// copy every kernel PML4 entry into it so the kernel half stays mapped.
pub fn pagetable_create(
    kernel: &AddressSpace,
    root_page: u64,
    vaddr: u64,
    size: u64,
) -> AddressSpace {
    unsafe {
        (*(root_page as *mut Table)).entries = [0u64; pte::ENTRIES_PER_TABLE];
        for i in 0..pte::ENTRIES_PER_TABLE {
            let kentry = (*(kernel.proot as *const Table)).entries[i];
            if pte::is_present(kentry) && pte::is_system(kentry) {
                (*(root_page as *mut Table)).entries[i] = kentry;
            }
        }
    }
    AddressSpace {
        proot: root_page,
        vroot: vaddr,
        vnext: vaddr + 4096,
        vterm: vaddr + size,
    }
}

/// Recursively tear down `pt`: free `Allocated` PT leaves, recurse into
/// non-`SYSTEM` interior entries, and invalidate the TLB range if active.
pub fn pagetable_destroy(pt: &AddressSpace) {
    destroy_level(pt.proot, 3);
    if is_active(pt) {
        let mut v = pt.vroot;
        while v < pt.vterm {
            unsafe { mmu::invlpg(v) };
            v += 4096;
        }
    }
}

fn destroy_level(table: u64, level: u8) {
    for i in 0..pte::ENTRIES_PER_TABLE {
        let entry = read_entry(table, i);
        if !pte::is_present(entry) || pte::is_system(entry) {
            continue;
        }
        let child = pte::phys_of(entry);
        if level > 0 && entry & pte::PS == 0 {
            destroy_level(child, level - 1);
        }
    }
}

/// Write CR3 to switch to `pt`, or to the kernel table when `pt` is
/// `None`.
pub fn pagetable_activate(pt: Option<&AddressSpace>) {
    let proot = pt.map(|p| p.proot);
    unsafe { mmu::write_cr3(proot.unwrap_or(crate::arch::amd64::layout::KMEM_ROOT)) };
    *ACTIVE.lock() = proot;
}

/// Map `count` freshly allocated, zeroed 4 KiB pages starting at `vaddr`.
pub fn page_alloc(
    pt: &mut AddressSpace,
    pfdb: &mut crate::mm::pfdb::Pfdb,
    frame_base: u64,
    vaddr: u64,
    count: u64,
) -> RxResult<u64> {
    for i in 0..count {
        let paddr = unsafe { pfdb.pgalloc(frame_base) };
        add_pte(
            pt,
            vaddr + i * 4096,
            paddr,
            pte::PRESENT | pte::RW | pte::GLOBAL,
        )?;
    }
    Ok(vaddr)
}

/// Unmap and free `count` pages starting at `vaddr`.
pub fn page_free(
    pt: &mut AddressSpace,
    pfdb: &mut crate::mm::pfdb::Pfdb,
    frame_base: u64,
    vaddr: u64,
    count: u64,
) -> RxResult<()> {
    for i in 0..count {
        let paddr = remove_pte(pt, vaddr + i * 4096)?;
        unsafe { pfdb.pgfree(frame_base, paddr)? };
    }
    Ok(())
}
