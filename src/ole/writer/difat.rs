//! Master sector allocation table (MSAT) for OLE2 files
//!
//! The MSAT lists the sectors that hold the SAT itself. The header embeds
//! the first 109 references; any further references go to dedicated MSAT
//! sectors chained from the header.
//!
//! # Implementation Notes
//!
//! - [`MasterAllocator`] wraps the main [`SectorAllocator`] and records the
//!   sectors consumed by each allocation made through it
//! - Each MSAT sector contains SAT sector IDs and a pointer to the next MSAT
//!   sector: 127 IDs + 1 next pointer for 512-byte sectors
//! - MSAT sectors are marked DIFSECT in the SAT; SAT sectors FATSECT

use super::super::consts::*;
use super::fat::{Allocation, SectorAllocator};
use crate::common::Result;
use crate::common::binary::BinaryWriter;
use bytes::Bytes;

/// Allocator wrapper that records which sectors store the SAT.
///
/// Plain allocations go through [`sat_mut`](Self::sat_mut); allocations
/// made through [`allocate`](Self::allocate) are additionally recorded and
/// become the MSAT entries.
#[derive(Debug)]
pub struct MasterAllocator {
    sat: SectorAllocator,
    recorded: Vec<u32>,
}

impl MasterAllocator {
    /// Wrap `sat`.
    pub fn new(sat: SectorAllocator) -> Self {
        Self {
            sat,
            recorded: Vec::new(),
        }
    }

    /// The wrapped allocator.
    pub fn sat(&self) -> &SectorAllocator {
        &self.sat
    }

    /// The wrapped allocator, for allocations that are not recorded.
    pub fn sat_mut(&mut self) -> &mut SectorAllocator {
        &mut self.sat
    }

    /// Allocate through the wrapped allocator and record the sectors used.
    pub fn allocate(&mut self, byte_len: usize, terminator: u32) -> Result<Allocation> {
        let allocation = self.sat.allocate(byte_len, terminator)?;
        self.recorded.extend_from_slice(&allocation.sectors);
        Ok(allocation)
    }

    /// Every sector recorded so far, in allocation order.
    pub fn allocations(&self) -> &[u32] {
        &self.recorded
    }

    /// References that need dedicated MSAT sectors.
    pub fn overflow_entries(&self) -> &[u32] {
        &self.recorded[self.recorded.len().min(HEADER_MSAT_ENTRIES)..]
    }
}

/// SAT sector IDs that fit in one MSAT sector (the last slot is the link).
#[inline]
pub fn ids_per_msat_sector(sector_size: usize) -> usize {
    sector_size / 4 - 1
}

/// MSAT sectors needed to list `sat_sectors` SAT sectors.
pub fn msat_sector_count(sat_sectors: usize, sector_size: usize) -> usize {
    sat_sectors
        .saturating_sub(HEADER_MSAT_ENTRIES)
        .div_ceil(ids_per_msat_sector(sector_size))
}

/// Size the SAT and the MSAT for `used` sectors of other content.
///
/// Both tables occupy sectors that the SAT must describe, so the sizes are
/// iterated until they stop growing. Returns `(sat_sectors, msat_sectors)`.
pub fn table_sector_counts(used: usize, sector_size: usize) -> (usize, usize) {
    let entries_per_sector = sector_size / 4;
    let mut n_sat = 0usize;
    let mut n_msat = 0usize;

    loop {
        let total = used + n_sat + n_msat;
        let new_sat = total.div_ceil(entries_per_sector);
        let new_msat = msat_sector_count(new_sat, sector_size);
        if new_sat == n_sat && new_msat == n_msat {
            return (n_sat, n_msat);
        }
        n_sat = new_sat;
        n_msat = new_msat;
    }
}

/// Encode the overflow references into MSAT sectors.
///
/// `msat_sectors` are the physical sectors the MSAT occupies, in chain
/// order; each encoded sector ends with the index of the next one, or
/// ENDOFCHAIN, and unused slots read FREESECT.
pub fn encode_overflow(
    overflow: &[u32],
    msat_sectors: &[u32],
    sector_size: usize,
) -> Result<Bytes> {
    let per_sector = ids_per_msat_sector(sector_size);
    let mut writer = BinaryWriter::new(Vec::with_capacity(msat_sectors.len() * sector_size));

    for (i, _) in msat_sectors.iter().enumerate() {
        let start = (i * per_sector).min(overflow.len());
        let end = ((i + 1) * per_sector).min(overflow.len());
        for &id in &overflow[start..end] {
            writer.write_u32(id)?;
        }
        for _ in (end - start)..per_sector {
            writer.write_u32(FREESECT)?;
        }
        let next = msat_sectors.get(i + 1).copied().unwrap_or(ENDOFCHAIN);
        writer.write_u32(next)?;
    }

    Ok(Bytes::from(writer.into_inner()))
}
