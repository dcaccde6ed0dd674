//! Sector allocation tables for OLE2 files
//!
//! A [`SectorAllocator`] hands out chains of fixed-size sectors and records,
//! per sector, the index of the next sector in its chain. The same type
//! backs the main SAT (512-byte sectors) and the SSAT (64-byte sectors of
//! the short-stream region).
//!
//! # Implementation Notes
//!
//! - Regular sectors hold the index of the next sector of their chain
//! - The last sector of a chain holds the chain's terminator, normally
//!   ENDOFCHAIN (0xFFFFFFFE); SAT and MSAT sectors use FATSECT / DIFSECT
//! - Unassigned slots read FREESECT (0xFFFFFFFF)
//! - Content is bound to sectors after allocation and emitted in ascending
//!   sector order, which fixes the on-disk layout of every region sharing
//!   one allocator

use super::super::consts::*;
use crate::common::binary::BinaryWriter;
use crate::common::{Error, Result};
use bytes::Bytes;
use fixedbitset::FixedBitSet;
use once_cell::unsync::OnceCell;
use std::io::Write;
use tracing::trace;

/// Result of a single [`SectorAllocator::allocate`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// First sector of the chain
    pub head: u32,
    /// Every sector consumed by the call, in chain order
    pub sectors: Vec<u32>,
}

#[derive(Debug, Clone)]
struct Slot {
    /// Next sector, terminator, or FREESECT when unassigned
    next: u32,
    /// Bytes emitted for this sector; shorter than a sector means padded
    content: Option<Bytes>,
    /// Byte used to pad `content` up to the sector size
    fill: u8,
}

/// Chain allocator over fixed-size sectors.
///
/// Allocation is first-fit: every request claims the lowest unassigned
/// slots, growing the table as needed. Slots are never released, so the
/// scan resumes from the lowest slot that can still be free.
#[derive(Debug)]
pub struct SectorAllocator {
    sector_size: usize,
    default_fill: u8,
    slots: Vec<Slot>,
    /// Lowest index that may still be unassigned
    first_free: usize,
    /// Chain-entry snapshot, dropped whenever a slot is assigned
    snapshot: OnceCell<Vec<u32>>,
}

impl SectorAllocator {
    /// Create an allocator whose unbound sectors are emitted as zeros.
    pub fn new(sector_size: usize) -> Self {
        Self::with_fill(sector_size, 0)
    }

    /// Create an allocator whose unbound sectors are emitted as `fill`.
    pub fn with_fill(sector_size: usize, fill: u8) -> Self {
        assert!(sector_size.is_power_of_two(), "Sector size must be a power of two");

        Self {
            sector_size,
            default_fill: fill,
            slots: Vec::new(),
            first_free: 0,
            snapshot: OnceCell::new(),
        }
    }

    /// Sector size in bytes.
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    /// Number of sectors tracked by the table (assigned or not).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing has been allocated yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Sectors needed to hold `byte_len` bytes; zero still takes one sector.
    #[inline]
    pub fn sectors_for(&self, byte_len: usize) -> usize {
        byte_len.div_ceil(self.sector_size).max(1)
    }

    /// Allocate a chain covering `byte_len` bytes, ending in `terminator`.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` if the chain would need a sector index above
    /// MAXREGSECT.
    pub fn allocate(&mut self, byte_len: usize, terminator: u32) -> Result<Allocation> {
        let count = self.sectors_for(byte_len);
        let mut sectors = Vec::with_capacity(count);

        let mut cursor = self.first_free;
        for _ in 0..count {
            let index = self.claim_from(cursor)?;
            sectors.push(index);
            cursor = index as usize + 1;
        }

        for pair in sectors.windows(2) {
            self.slots[pair[0] as usize].next = pair[1];
        }
        if let Some(&last) = sectors.last() {
            self.slots[last as usize].next = terminator;
        }

        while self.first_free < self.slots.len() && self.slots[self.first_free].next != FREESECT {
            self.first_free += 1;
        }
        self.snapshot.take();

        let head = sectors[0];
        trace!(
            head,
            sectors = count,
            sector_size = self.sector_size,
            "allocated chain"
        );
        Ok(Allocation { head, sectors })
    }

    /// Claim the first unassigned slot at or after `start`.
    fn claim_from(&mut self, start: usize) -> Result<u32> {
        let index = (start..self.slots.len())
            .find(|&i| self.slots[i].next == FREESECT)
            .unwrap_or(self.slots.len());

        if index as u64 > MAXREGSECT as u64 {
            return Err(Error::CapacityExceeded(format!(
                "sector index {} is above the largest regular sector",
                index
            )));
        }

        if index == self.slots.len() {
            self.slots.push(Slot {
                next: FREESECT,
                content: None,
                fill: self.default_fill,
            });
        }
        // Placeholder until the chain is linked
        self.slots[index].next = ENDOFCHAIN;
        Ok(index as u32)
    }

    /// Follow a chain from `head`, returning its sectors in order.
    ///
    /// # Errors
    ///
    /// `LookupNotFound` for an unassigned head, `InvalidChain` for a
    /// chain that revisits a sector or leaves the table.
    pub fn chain(&self, head: u32) -> Result<Vec<u32>> {
        let mut sectors = Vec::new();
        let mut current = head;

        match self.slots.get(head as usize) {
            Some(slot) if slot.next != FREESECT => {},
            _ => {
                return Err(Error::LookupNotFound(format!(
                    "sector {} is not the head of an allocated chain",
                    head
                )));
            },
        }

        loop {
            if sectors.len() > self.slots.len() {
                return Err(Error::InvalidChain(format!(
                    "chain starting at {} does not terminate",
                    head
                )));
            }
            sectors.push(current);
            let next = match self.slots.get(current as usize) {
                Some(slot) => slot.next,
                None => {
                    return Err(Error::InvalidChain(format!(
                        "chain starting at {} leaves the table at {}",
                        head, current
                    )));
                },
            };
            if next > MAXREGSECT {
                break;
            }
            current = next;
        }

        Ok(sectors)
    }

    /// Bind `content` across the chain starting at `head`.
    ///
    /// The last sector's unused tail is emitted as `fill`.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` if the content does not fit in the chain.
    pub fn allocate_stream_content(&mut self, head: u32, content: Bytes, fill: u8) -> Result<()> {
        let chain = self.chain(head)?;
        let capacity = chain.len() * self.sector_size;
        if content.len() > capacity {
            return Err(Error::CapacityExceeded(format!(
                "{} bytes do not fit a chain of {} sectors",
                content.len(),
                chain.len()
            )));
        }

        for (i, &sector) in chain.iter().enumerate() {
            let start = (i * self.sector_size).min(content.len());
            let end = ((i + 1) * self.sector_size).min(content.len());
            let slot = &mut self.slots[sector as usize];
            slot.content = Some(content.slice(start..end));
            slot.fill = fill;
        }

        Ok(())
    }

    /// Chain-entry values of every sector, by sector index.
    ///
    /// The snapshot is rebuilt on first access after an allocation.
    pub fn allocations(&self) -> &[u32] {
        self.snapshot
            .get_or_init(|| self.slots.iter().map(|slot| slot.next).collect())
    }

    /// Encode the table as little-endian u32 entries, padded with FREESECT
    /// to a whole number of `container_sector_size` sectors.
    pub fn encode_table(&self, container_sector_size: usize) -> Result<Bytes> {
        let entries = self.allocations();
        let byte_len = (entries.len() * 4).div_ceil(container_sector_size) * container_sector_size;

        let mut writer = BinaryWriter::new(Vec::with_capacity(byte_len));
        for &entry in entries {
            writer.write_u32(entry)?;
        }
        writer.write_repeated(byte_len - entries.len() * 4, TABLE_FILL)?;
        Ok(Bytes::from(writer.into_inner()))
    }

    /// Emit every sector in ascending index order.
    ///
    /// Returns the number of bytes written.
    pub fn write_all_sectors_to<W: Write>(&self, sink: &mut BinaryWriter<W>) -> Result<u64> {
        let start = sink.position();
        for slot in &self.slots {
            let used = match &slot.content {
                Some(content) => {
                    sink.write_bytes(content)?;
                    content.len()
                },
                None => 0,
            };
            let fill = if slot.content.is_some() {
                slot.fill
            } else {
                self.default_fill
            };
            sink.write_repeated(self.sector_size - used, fill)?;
        }
        Ok(sink.position() - start)
    }

    /// Emit every sector into a single buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut sink = BinaryWriter::new(Vec::with_capacity(self.slots.len() * self.sector_size));
        self.write_all_sectors_to(&mut sink)?;
        Ok(Bytes::from(sink.into_inner()))
    }

    /// Check the table for consistency
    ///
    /// Checks that:
    /// - every link stays inside the table
    /// - no sector is the successor of two sectors
    /// - every chain terminates without revisiting a sector
    pub fn validate(&self) -> Result<()> {
        let len = self.slots.len();
        let mut has_predecessor = FixedBitSet::with_capacity(len);

        for (index, slot) in self.slots.iter().enumerate() {
            let next = slot.next;
            if next > MAXREGSECT {
                continue;
            }
            if next as usize >= len {
                return Err(Error::InvalidChain(format!(
                    "sector {} links to {} outside the table of {}",
                    index, next, len
                )));
            }
            if has_predecessor.put(next as usize) {
                return Err(Error::InvalidChain(format!(
                    "sector {} belongs to more than one chain",
                    next
                )));
            }
        }

        let mut visited = FixedBitSet::with_capacity(len);
        for head in 0..len {
            if has_predecessor.contains(head) || self.slots[head].next == FREESECT {
                continue;
            }
            let mut current = head;
            loop {
                if visited.put(current) {
                    return Err(Error::InvalidChain(format!(
                        "circular reference detected at sector {}",
                        current
                    )));
                }
                let next = self.slots[current].next;
                if next > MAXREGSECT {
                    break;
                }
                current = next as usize;
            }
        }

        // Assigned sectors that no head reaches can only sit on a cycle
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.next != FREESECT && !visited.contains(index) {
                return Err(Error::InvalidChain(format!(
                    "circular reference detected at sector {}",
                    index
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;
    use proptest::prelude::*;

    #[test]
    fn test_allocate_chain() {
        let mut sat = SectorAllocator::new(512);

        // 1024 bytes with 512-byte sectors is two sectors
        let alloc = sat.allocate(1024, ENDOFCHAIN).unwrap();
        assert_eq!(alloc.head, 0);
        assert_eq!(alloc.sectors, vec![0, 1]);
        assert_eq!(sat.allocations(), &[1, ENDOFCHAIN]);
    }

    #[test]
    fn test_zero_length_reserves_one_sector() {
        let mut sat = SectorAllocator::new(512);
        let alloc = sat.allocate(0, ENDOFCHAIN).unwrap();
        assert_eq!(alloc.sectors, vec![0]);
        assert_eq!(sat.len(), 1);
    }

    #[test]
    fn test_partial_sector_rounds_up() {
        let mut sat = SectorAllocator::new(512);
        let alloc = sat.allocate(5000, ENDOFCHAIN).unwrap();
        assert_eq!(alloc.sectors.len(), 10);
        assert_eq!(sat.chain(alloc.head).unwrap(), alloc.sectors);
    }

    #[test]
    fn test_custom_terminator() {
        let mut sat = SectorAllocator::new(512);
        sat.allocate(100, ENDOFCHAIN).unwrap();
        let fat_sector = sat.allocate(512, FATSECT).unwrap();
        assert_eq!(fat_sector.sectors, vec![1]);
        assert_eq!(sat.allocations()[1], FATSECT);
        assert_eq!(sat.chain(1).unwrap(), vec![1]);
    }

    #[test]
    fn test_snapshot_refreshes_after_allocation() {
        let mut sat = SectorAllocator::new(64);
        sat.allocate(10, ENDOFCHAIN).unwrap();
        assert_eq!(sat.allocations().len(), 1);
        sat.allocate(100, ENDOFCHAIN).unwrap();
        assert_eq!(sat.allocations(), &[ENDOFCHAIN, 2, ENDOFCHAIN]);
    }

    #[test]
    fn test_bind_and_emit_padded() {
        let mut sat = SectorAllocator::new(64);
        let a = sat.allocate(70, ENDOFCHAIN).unwrap();
        let b = sat.allocate(1, ENDOFCHAIN).unwrap();
        sat.allocate_stream_content(a.head, Bytes::from(vec![0xAA; 70]), 0x00)
            .unwrap();
        sat.allocate_stream_content(b.head, Bytes::from_static(b"x"), 0xFF)
            .unwrap();

        let out = sat.to_bytes().unwrap();
        assert_eq!(out.len(), 3 * 64);
        assert!(out[..70].iter().all(|&v| v == 0xAA));
        assert!(out[70..128].iter().all(|&v| v == 0x00));
        assert_eq!(out[128], b'x');
        assert!(out[129..].iter().all(|&v| v == 0xFF));
    }

    #[test]
    fn test_unbound_sectors_use_default_fill() {
        let mut sat = SectorAllocator::with_fill(64, 0xEE);
        sat.allocate(64, ENDOFCHAIN).unwrap();
        let out = sat.to_bytes().unwrap();
        assert!(out.iter().all(|&v| v == 0xEE));
    }

    #[test]
    fn test_content_larger_than_chain() {
        let mut sat = SectorAllocator::new(64);
        let a = sat.allocate(64, ENDOFCHAIN).unwrap();
        let err = sat
            .allocate_stream_content(a.head, Bytes::from(vec![0; 65]), 0)
            .unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(_)));
    }

    #[test]
    fn test_chain_of_unassigned_sector() {
        let sat = SectorAllocator::new(512);
        assert!(matches!(sat.chain(3), Err(Error::LookupNotFound(_))));
    }

    #[test]
    fn test_encode_table() {
        let mut sat = SectorAllocator::new(512);
        sat.allocate(1024, ENDOFCHAIN).unwrap();
        let table = sat.encode_table(512).unwrap();
        assert_eq!(table.len(), 512);

        let mut reader = table.clone();
        assert_eq!(reader.get_u32_le(), 1);
        assert_eq!(reader.get_u32_le(), ENDOFCHAIN);
        assert_eq!(reader.get_u32_le(), FREESECT);
    }

    #[test]
    fn test_validate_detects_cycle() {
        let mut sat = SectorAllocator::new(512);
        sat.allocate(1024, ENDOFCHAIN).unwrap();
        assert!(sat.validate().is_ok());

        sat.slots[1].next = 0;
        assert!(matches!(sat.validate(), Err(Error::InvalidChain(_))));
    }

    #[test]
    fn test_validate_detects_shared_sector() {
        let mut sat = SectorAllocator::new(512);
        sat.allocate(1024, ENDOFCHAIN).unwrap();
        sat.allocate(512, ENDOFCHAIN).unwrap();
        sat.slots[2].next = 1;
        assert!(matches!(sat.validate(), Err(Error::InvalidChain(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_chains_are_well_formed(sizes in prop::collection::vec(0usize..5000, 1..40)) {
            let mut sat = SectorAllocator::new(512);
            let mut allocations = Vec::new();
            for &size in &sizes {
                allocations.push((size, sat.allocate(size, ENDOFCHAIN).unwrap()));
            }

            prop_assert!(sat.validate().is_ok());

            let mut seen = std::collections::HashSet::new();
            for (size, alloc) in &allocations {
                let chain = sat.chain(alloc.head).unwrap();
                prop_assert_eq!(&chain, &alloc.sectors);
                prop_assert_eq!(chain.len(), size.div_ceil(512).max(1));
                for sector in chain {
                    prop_assert!(seen.insert(sector), "sector {} reused", sector);
                }
            }
            prop_assert_eq!(seen.len(), sat.len());
        }
    }
}
