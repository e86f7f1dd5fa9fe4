// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! MADT (Multiple APIC Description Table) parsing.
//!
//! Matches the `acpi::madt` entry layout, but streams entries via bounded
//! iterators (`next_local_apic`/`next_io_apic`/`next_iso`) instead of
//! collecting into fixed-size arrays, so the walker never imposes an
//! artificial entry cap (§4.2 "Iterators").

use crate::acpi::sdt::SdtHeader;

pub const MADT_SIGNATURE: &[u8; 4] = b"APIC";

/// MADT entry type discriminants (ACPI spec table 5-45, subset in use).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MadtEntryType {
    LocalApic = 0,
    IoApic = 1,
    InterruptSourceOverride = 2,
    Other(u8),
}

impl From<u8> for MadtEntryType {
    fn from(v: u8) -> Self {
        match v {
            0 => MadtEntryType::LocalApic,
            1 => MadtEntryType::IoApic,
            2 => MadtEntryType::InterruptSourceOverride,
            other => MadtEntryType::Other(other),
        }
    }
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
struct MadtEntryHeader {
    entry_type: u8,
    length: u8,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct LocalApicEntry {
    pub acpi_processor_id: u8,
    pub apic_id: u8,
    pub flags: u32,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct IoApicEntry {
    pub io_apic_id: u8,
    pub _reserved: u8,
    pub address: u32,
    pub global_system_interrupt_base: u32,
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct InterruptSourceOverrideEntry {
    pub bus: u8,
    pub source: u8,
    pub global_system_interrupt: u32,
    pub flags: u16,
}

/// Parsed view over a MADT's fixed header plus the raw entry list.
pub struct Madt {
    /// Physical address of the local APIC, overridden by a 64-bit
    /// override entry type (type 5) if present — not modeled here since
    /// this crate targets the legacy 8259 PIC path (§4.5 supplement).
    pub local_apic_address: u32,
    pub flags: u32,
    entries_base: u64,
    entries_len: usize,
}

impl Madt {
    /// `header_addr` must already be mapped through the table's full
    /// `length` bytes.
    ///
    /// # Safety
    /// Caller must guarantee the table is mapped and its `length` field
    /// is trustworthy (verified by the walker's checksum check).
    pub unsafe fn from_table(header_addr: u64) -> Madt {
        let header = SdtHeader::read(header_addr);
        let fixed = header_addr + core::mem::size_of::<SdtHeader>() as u64;
        let local_apic_address = core::ptr::read_unaligned(fixed as *const u32);
        let flags = core::ptr::read_unaligned((fixed + 4) as *const u32);
        let entries_base = fixed + 8;
        let entries_len = header.length as usize
            - core::mem::size_of::<SdtHeader>()
            - 8;
        Madt {
            local_apic_address,
            flags,
            entries_base,
            entries_len,
        }
    }

    fn entries(&self) -> MadtEntryIter<'_> {
        MadtEntryIter {
            madt: self,
            offset: 0,
        }
    }

    /// Stream every Processor Local APIC entry.
    pub fn next_local_apic(&self) -> impl Iterator<Item = LocalApicEntry> + '_ {
        self.entries().filter_map(|(ty, addr)| {
            if ty == MadtEntryType::LocalApic {
                Some(unsafe { core::ptr::read_unaligned(addr as *const LocalApicEntry) })
            } else {
                None
            }
        })
    }

    /// Stream every I/O APIC entry.
    pub fn next_io_apic(&self) -> impl Iterator<Item = IoApicEntry> + '_ {
        self.entries().filter_map(|(ty, addr)| {
            if ty == MadtEntryType::IoApic {
                Some(unsafe { core::ptr::read_unaligned(addr as *const IoApicEntry) })
            } else {
                None
            }
        })
    }

    /// Stream every Interrupt Source Override entry.
    pub fn next_iso(&self) -> impl Iterator<Item = InterruptSourceOverrideEntry> + '_ {
        self.entries().filter_map(|(ty, addr)| {
            if ty == MadtEntryType::InterruptSourceOverride {
                Some(unsafe {
                    core::ptr::read_unaligned(addr as *const InterruptSourceOverrideEntry)
                })
            } else {
                None
            }
        })
    }

    /// Scan the raw entry list once and report whether it ended on a
    /// corrupt entry (zero length, or a length overshooting the table)
    /// rather than simply running out of room for another header (§4.2
    /// "Failures": an overshooting/unknown-length entry is `fatal`, a
    /// clean end of table is not).
    pub fn is_truncated(&self) -> bool {
        let mut offset = 0usize;
        loop {
            if offset + core::mem::size_of::<MadtEntryHeader>() > self.entries_len {
                return false;
            }
            let entry_addr = self.entries_base + offset as u64;
            let hdr = unsafe { core::ptr::read_unaligned(entry_addr as *const MadtEntryHeader) };
            if hdr.length == 0 || offset + hdr.length as usize > self.entries_len {
                return true;
            }
            offset += hdr.length as usize;
        }
    }
}

struct MadtEntryIter<'a> {
    madt: &'a Madt,
    offset: usize,
}

impl Iterator for MadtEntryIter<'_> {
    type Item = (MadtEntryType, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + core::mem::size_of::<MadtEntryHeader>() > self.madt.entries_len {
            return None;
        }
        let entry_addr = self.madt.entries_base + self.offset as u64;
        let hdr = unsafe { core::ptr::read_unaligned(entry_addr as *const MadtEntryHeader) };
        if hdr.length == 0 || self.offset + hdr.length as usize > self.madt.entries_len {
            // A zero-length or overshooting entry means corrupt firmware
            // data; §4.2 "Failures" calls this a `fatal` condition for the
            // overall walk, but the iterator itself just stops here so the
            // caller can decide.
            return None;
        }
        let body = entry_addr + core::mem::size_of::<MadtEntryHeader>() as u64;
        self.offset += hdr.length as usize;
        Some((MadtEntryType::from(hdr.entry_type), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_madt(entries: &[(u8, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0xFEE0_0000u32.to_le_bytes()); // local apic addr
        body.extend_from_slice(&0u32.to_le_bytes()); // flags
        for (ty, payload) in entries {
            body.push(*ty);
            body.push((2 + payload.len()) as u8);
            body.extend_from_slice(payload);
        }
        let total_len = core::mem::size_of::<SdtHeader>() + body.len();
        let header = SdtHeader {
            signature: *MADT_SIGNATURE,
            length: total_len as u32,
            revision: 3,
            checksum: 0,
            oem_id: [0; 6],
            oem_table_id: [0; 8],
            oem_revision: 0,
            creator_id: 0,
            creator_revision: 0,
        };
        let mut buf = vec![0u8; total_len];
        unsafe {
            core::ptr::write_unaligned(buf.as_mut_ptr() as *mut SdtHeader, header);
        }
        buf[core::mem::size_of::<SdtHeader>()..].copy_from_slice(&body);
        buf
    }

    #[test]
    fn streams_local_apic_and_io_apic_entries() {
        let local_apic_payload = [0u8, 1, 1, 0, 0, 0]; // id=0, apic_id=1, flags=1
        let io_apic_payload = {
            let mut p = vec![2u8, 0];
            p.extend_from_slice(&0xFEC0_0000u32.to_le_bytes());
            p.extend_from_slice(&0u32.to_le_bytes());
            p
        };
        let buf = build_madt(&[(0, &local_apic_payload), (1, &io_apic_payload)]);
        let madt = unsafe { Madt::from_table(buf.as_ptr() as u64) };

        let locals: Vec<_> = madt.next_local_apic().collect();
        assert_eq!(locals.len(), 1);
        assert_eq!(locals[0].apic_id, 1);

        let ioapics: Vec<_> = madt.next_io_apic().collect();
        assert_eq!(ioapics.len(), 1);
        assert_eq!(ioapics[0].io_apic_id, 2);
    }

    #[test]
    fn stops_at_zero_length_entry_instead_of_overrunning() {
        let buf = build_madt(&[]);
        let madt = unsafe { Madt::from_table(buf.as_ptr() as u64) };
        assert_eq!(madt.next_local_apic().count(), 0);
    }

    #[test]
    fn clean_table_is_not_truncated() {
        let local_apic_payload = [0u8, 1, 1, 0, 0, 0];
        let buf = build_madt(&[(0, &local_apic_payload)]);
        let madt = unsafe { Madt::from_table(buf.as_ptr() as u64) };
        assert!(!madt.is_truncated());
    }

    #[test]
    fn zero_length_entry_is_reported_truncated() {
        // A single entry whose length byte is forced to 0, with padding
        // left in the table so the iterator (and the scan) see it as a
        // corrupt entry rather than simply running out of room.
        let local_apic_payload = [0u8, 1, 1, 0, 0, 0];
        let mut buf = build_madt(&[(0, &local_apic_payload)]);
        let entries_start = core::mem::size_of::<SdtHeader>() + 8;
        buf[entries_start + 1] = 0; // corrupt the length byte of the one entry
        buf.extend_from_slice(&[0u8; 8]); // pad so there's room past the header
        let total_len = buf.len();
        unsafe {
            (*(buf.as_mut_ptr() as *mut SdtHeader)).length = total_len as u32;
        }
        let madt = unsafe { Madt::from_table(buf.as_ptr() as u64) };
        assert!(madt.is_truncated());
    }
}
