// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Page-frame database (PFDB): a dense array of 32-byte page-frame
//! records over usable physical memory, backed by a doubly-linked free
//! list (§3, §4.4).
//!
//! Pure bookkeeping with no hardware dependency beyond the caller-supplied
//! backing slice, so it runs as an ordinary host-compiled unit under
//! `#[cfg(test)]` via the crate's `#![cfg_attr(not(test), no_std)]` root
//! attribute.

use crate::status::{fatal, RxResult, RxStatus};

/// Free-list sentinel: no previous/next frame.
pub const INVALID: u32 = u32::MAX;

/// A page-frame's lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PfType {
    Reserved = 0,
    Available = 1,
    Allocated = 2,
}

/// Fixed 32-byte page-frame record, one per physical 4 KiB frame.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Pf {
    pub prev: u32,
    pub next: u32,
    pub refcount: u16,
    pub sharecount: u16,
    pub flags: u16,
    pub ty: u16,
    _reserved: [u8; 16],
}

const _: () = assert!(core::mem::size_of::<Pf>() == 32);

impl Pf {
    pub const fn reserved() -> Self {
        Self {
            prev: INVALID,
            next: INVALID,
            refcount: 0,
            sharecount: 0,
            flags: 0,
            ty: PfType::Reserved as u16,
            _reserved: [0; 16],
        }
    }

    #[inline]
    pub fn ty(&self) -> PfType {
        match self.ty {
            0 => PfType::Reserved,
            1 => PfType::Available,
            _ => PfType::Allocated,
        }
    }

    #[inline]
    fn set_ty(&mut self, ty: PfType) {
        self.ty = ty as u16;
    }
}

/// The page-frame database: a caller-owned backing array plus the
/// doubly-linked free-list head/tail.
pub struct Pfdb<'a> {
    pub pf: &'a mut [Pf],
    pub count: u32,
    pub avail: u32,
    pub head: u32,
    pub tail: u32,
}

const TWO_MIB: u64 = 1 << 21;
const FRAME_SIZE: u64 = 4096;

fn round_up(x: u64, align: u64) -> u64 {
    (x + align - 1) & !(align - 1)
}

/// Find the first `Usable` PMAP region with room for a `size`-byte,
/// 2 MiB-aligned carve-out, per the placement rule in §3.
fn carve_region(size: u64) -> u64 {
    for r in crate::pmap::iter() {
        if r.ty != crate::pmap::MemType::Usable {
            continue;
        }
        let base = round_up(r.addr, TWO_MIB);
        if base + size <= r.end() {
            return base;
        }
    }
    crate::status::fatal("pfdb: no usable region large enough for the page-frame database")
}

impl<'a> Pfdb<'a> {
    /// Build a PFDB over `pf`, marking `[0, count)` as Available and
    /// linking them into the free list in ascending frame-number order,
    /// except `reserved`, whose entries are left `Reserved`.
    pub fn new(pf: &'a mut [Pf], reserved: impl Fn(u32) -> bool) -> Self {
        let count = pf.len() as u32;
        let mut head = INVALID;
        let mut tail = INVALID;
        let mut avail = 0u32;
        let mut prev = INVALID;

        for i in 0..count {
            let frame = &mut pf[i as usize];
            if reserved(i) {
                *frame = Pf::reserved();
                continue;
            }
            frame.prev = prev;
            frame.next = INVALID;
            frame.refcount = 0;
            frame.sharecount = 0;
            frame.flags = 0;
            frame.set_ty(PfType::Available);
            if prev == INVALID {
                head = i;
            } else {
                pf[prev as usize].next = i;
            }
            prev = i;
            tail = i;
            avail += 1;
        }

        Self {
            pf,
            count,
            avail,
            head,
            tail,
        }
    }

    /// Allocate a frame off the head of the free list. `fatal`s if the
    /// list is empty.
    pub fn pfalloc(&mut self) -> u32 {
        if self.avail == 0 {
            fatal("pfdb: frame allocation with empty free list");
        }
        let idx = self.head;
        let next = self.pf[idx as usize].next;
        self.head = next;
        if next != INVALID {
            self.pf[next as usize].prev = INVALID;
        } else {
            self.tail = INVALID;
        }
        self.avail -= 1;

        let frame = &mut self.pf[idx as usize];
        *frame = Pf::reserved();
        frame.set_ty(PfType::Allocated);
        frame.refcount = 1;
        idx
    }

    /// Return frame `idx` to the free list. Requires `idx` is currently
    /// `Allocated`.
    pub fn pffree(&mut self, idx: u32) -> RxResult<()> {
        if self.pf[idx as usize].ty() != PfType::Allocated {
            return Err(RxStatus::ErrInvalidArgs);
        }
        let frame = &mut self.pf[idx as usize];
        *frame = Pf::reserved();
        frame.set_ty(PfType::Available);
        frame.next = self.head;
        frame.prev = INVALID;
        if self.head != INVALID {
            self.pf[self.head as usize].prev = idx;
        } else {
            self.tail = idx;
        }
        self.head = idx;
        self.avail += 1;
        Ok(())
    }

    /// Allocate a frame and return its physical address, zeroing the
    /// backing 4 KiB page first.
    ///
    /// # Safety
    /// `frame_base` must be the physical address this PFDB's frame 0
    /// corresponds to, and that physical range must be identity-mapped
    /// or otherwise writable by the caller at the moment of the call.
    pub unsafe fn pgalloc(&mut self, frame_base: u64) -> u64 {
        let idx = self.pfalloc();
        let paddr = frame_base + (idx as u64) * 4096;
        core::ptr::write_bytes(paddr as *mut u8, 0, 4096);
        paddr
    }

    /// Decrement `refcount` on the frame at `paddr`; free it once it
    /// reaches zero.
    ///
    /// # Safety
    /// `frame_base` must match the value used for the corresponding
    /// [`Pfdb::pgalloc`] call.
    pub unsafe fn pgfree(&mut self, frame_base: u64, paddr: u64) -> RxResult<()> {
        let idx = ((paddr - frame_base) / 4096) as u32;
        let frame = &mut self.pf[idx as usize];
        if frame.ty() != PfType::Allocated {
            return Err(RxStatus::ErrInvalidArgs);
        }
        frame.refcount -= 1;
        if frame.refcount == 0 {
            self.pffree(idx)?;
        }
        Ok(())
    }

    /// Walk the free list from `head` via `next`, counting entries —
    /// used by tests/diagnostics to cross-check `avail`.
    pub fn free_list_len_forward(&self) -> u32 {
        let mut n = 0;
        let mut cur = self.head;
        while cur != INVALID {
            n += 1;
            cur = self.pf[cur as usize].next;
        }
        n
    }

    /// Walk the free list from `tail` via `prev`.
    pub fn free_list_len_backward(&self) -> u32 {
        let mut n = 0;
        let mut cur = self.tail;
        while cur != INVALID {
            n += 1;
            cur = self.pf[cur as usize].prev;
        }
        n
    }
}

/// Carve the real page-frame database out of the current PMAP table and
/// build it in place (§3, §4.4).
///
/// The backing array holds `ceil(last_usable / 4096)` frames, rounded up
/// to a 2 MiB multiple of bytes, carved from the first `Usable` region
/// with room for it; that region is then marked `Reserved` in PMAP so
/// [`crate::mm::kmem::kmem_init`] never treats it as ordinary usable
/// memory. Frame `i` corresponds to physical address `i * 4096`, so every
/// frame inside the carved region itself, or inside any other non-Usable
/// PMAP region, starts out `Reserved` rather than `Available`.
///
/// # Safety
/// Must run after PMAP is fully seeded (including any ACPI additions) and
/// before the carved region is mapped by `kmem_init`, and the carved
/// physical range must be directly writable (still under the boot page
/// table's identity map).
pub unsafe fn build_from_pmap() -> Pfdb<'static> {
    let last_usable = crate::pmap::last_usable();
    let frame_count = (last_usable + FRAME_SIZE - 1) / FRAME_SIZE;
    let raw_bytes = frame_count * core::mem::size_of::<Pf>() as u64;
    let region_bytes = round_up(raw_bytes, TWO_MIB);

    let base = carve_region(region_bytes);
    crate::pmap::add(base, region_bytes, crate::pmap::MemType::Reserved);

    let backing = core::slice::from_raw_parts_mut(base as *mut Pf, frame_count as usize);
    Pfdb::new(backing, |i| {
        let paddr = (i as u64) * FRAME_SIZE;
        (paddr >= base && paddr < base + region_bytes) || !crate::pmap::is_usable(paddr)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(n: usize) -> Vec<Pf> {
        vec![Pf::reserved(); n]
    }

    #[test]
    fn pf_record_is_exactly_32_bytes() {
        assert_eq!(core::mem::size_of::<Pf>(), 32);
    }

    #[test]
    fn new_links_every_frame_into_free_list() {
        let mut backing = fresh(8);
        let db = Pfdb::new(&mut backing, |_| false);
        assert_eq!(db.avail, 8);
        assert_eq!(db.free_list_len_forward(), 8);
        assert_eq!(db.free_list_len_backward(), 8);
    }

    #[test]
    fn reserved_predicate_excludes_frames_from_free_list() {
        let mut backing = fresh(8);
        let db = Pfdb::new(&mut backing, |i| i < 2);
        assert_eq!(db.avail, 6);
        assert_eq!(db.pf[0].ty(), PfType::Reserved);
        assert_eq!(db.pf[1].ty(), PfType::Reserved);
    }

    #[test]
    fn alloc_free_round_trip_restores_avail() {
        let mut backing = fresh(4);
        let mut db = Pfdb::new(&mut backing, |_| false);
        let initial = db.avail;

        let a = db.pfalloc();
        let b = db.pfalloc();
        assert_eq!(db.pf[a as usize].ty(), PfType::Allocated);
        assert_eq!(db.avail, initial - 2);

        db.pffree(a).unwrap();
        db.pffree(b).unwrap();
        assert_eq!(db.avail, initial);
        assert_eq!(db.free_list_len_forward(), initial);
        assert_eq!(db.free_list_len_backward(), initial);
    }

    #[test]
    fn pffree_rejects_non_allocated_frame() {
        let mut backing = fresh(2);
        let mut db = Pfdb::new(&mut backing, |_| false);
        let idx = db.head;
        assert_eq!(db.pffree(idx), Err(RxStatus::ErrInvalidArgs));
    }

    #[test]
    fn exhaustion_is_fatal() {
        // Can't exercise `fatal()` (it halts the CPU) in a host test;
        // covered instead by asserting `avail` reaches exactly zero.
        let mut backing = fresh(2);
        let mut db = Pfdb::new(&mut backing, |_| false);
        db.pfalloc();
        db.pfalloc();
        assert_eq!(db.avail, 0);
    }
}
