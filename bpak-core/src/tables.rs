//! C3: part and meta table operations.
//!
//! Slots are stored in fixed-size arrays inside [`Header`]; a slot with
//! `id == 0` is empty. Empty slots only ever trail live ones (header
//! invariants 4-5), so every mutation here is a linear scan plus a
//! left-shift compaction, never a branch into a hole.

use crate::error::BpakError;
use crate::header::{Header, MetaEntry, PartEntry};
use crate::Result;

impl Header {
    /// Append `id` into the first empty part slot.
    ///
    /// Fails with [`BpakError::Exists`] if a live slot already carries
    /// `id`, or [`BpakError::NoSpace`] if the table is full.
    pub fn add_part(&mut self, id: u32) -> Result<&mut PartEntry> {
        if id == 0 {
            return Err(BpakError::InvalidArgument("part id must not be 0".into()));
        }
        if self.parts.iter().any(|p| p.is_live() && p.id == id) {
            return Err(BpakError::Exists(alloc::format!(
                "part {id:#010x} already exists"
            )));
        }
        let slot = self
            .parts
            .iter_mut()
            .find(|p| !p.is_live())
            .ok_or_else(|| BpakError::NoSpace("parts table is full".into()))?;
        *slot = PartEntry {
            id,
            ..PartEntry::EMPTY
        };
        Ok(slot)
    }

    /// Find the live part slot with `id`.
    pub fn get_part(&self, id: u32) -> Result<&PartEntry> {
        self.parts
            .iter()
            .find(|p| p.is_live() && p.id == id)
            .ok_or_else(|| BpakError::NotFound(alloc::format!("part {id:#010x} not found")))
    }

    /// Find the live part slot with `id`, mutably.
    pub fn get_part_mut(&mut self, id: u32) -> Result<&mut PartEntry> {
        self.parts
            .iter_mut()
            .find(|p| p.is_live() && p.id == id)
            .ok_or_else(|| BpakError::NotFound(alloc::format!("part {id:#010x} not found")))
    }

    /// Remove the part slot with `id`, compacting remaining live slots
    /// left to preserve insertion order.
    pub fn del_part(&mut self, id: u32) -> Result<()> {
        let idx = self
            .parts
            .iter()
            .position(|p| p.is_live() && p.id == id)
            .ok_or_else(|| BpakError::NotFound(alloc::format!("part {id:#010x} not found")))?;
        for i in idx..self.parts.len() - 1 {
            self.parts[i] = self.parts[i + 1];
        }
        *self.parts.last_mut().unwrap() = PartEntry::EMPTY;
        Ok(())
    }

    /// Allocate `size` bytes at the end of the used meta pool and append a
    /// new meta slot `{id, part_ref, data_offset, size}`, returning a
    /// mutable view of the allocated bytes.
    ///
    /// Fails with [`BpakError::NoSpace`] if either table is full or the
    /// pool is exhausted.
    pub fn add_meta(&mut self, id: u32, part_ref: u32, size: u16) -> Result<&mut [u8]> {
        if id == 0 {
            return Err(BpakError::InvalidArgument("meta id must not be 0".into()));
        }
        let used: u32 = self
            .meta
            .iter()
            .filter(|m| m.is_live())
            .map(|m| m.data_offset as u32 + m.size as u32)
            .max()
            .unwrap_or(0);
        let pool_len = self.meta_data.len() as u32;
        if used + size as u32 > pool_len {
            return Err(BpakError::NoSpace("meta data pool is full".into()));
        }
        let slot = self
            .meta
            .iter_mut()
            .find(|m| !m.is_live())
            .ok_or_else(|| BpakError::NoSpace("meta table is full".into()))?;
        *slot = MetaEntry {
            id,
            part_id_ref: part_ref,
            data_offset: used as u16,
            size,
        };
        let start = used as usize;
        Ok(&mut self.meta_data[start..start + size as usize])
    }

    /// Find the first meta slot matching both `id` and `part_ref`.
    /// `part_ref == 0` means "global".
    pub fn get_meta(&self, id: u32, part_ref: u32) -> Result<&MetaEntry> {
        self.meta
            .iter()
            .find(|m| m.is_live() && m.id == id && m.part_id_ref == part_ref)
            .ok_or_else(|| BpakError::NotFound(alloc::format!("meta {id:#010x} not found")))
    }

    /// Bytes backing a meta slot's value.
    pub fn meta_bytes(&self, entry: &MetaEntry) -> &[u8] {
        let start = entry.data_offset as usize;
        &self.meta_data[start..start + entry.size as usize]
    }

    /// Iterate live part slots in storage (insertion) order.
    pub fn foreach_part(&self) -> impl Iterator<Item = &PartEntry> {
        self.parts.iter().filter(|p| p.is_live())
    }

    /// Iterate live meta slots in storage (insertion) order.
    pub fn foreach_meta(&self) -> impl Iterator<Item = &MetaEntry> {
        self.meta.iter().filter(|m| m.is_live())
    }
}

/// `part.offset`.
pub fn part_offset(part: &PartEntry) -> u64 {
    part.offset
}

/// The on-disk byte count for `part`'s body: `transport_size` if
/// [`crate::constants::PartFlags::TRANSPORT`] is set, else `size`.
pub fn part_size(part: &PartEntry) -> u64 {
    part.on_disk_size()
}

/// The nominal (plain, untransported) byte size of `part`, always `size`.
pub fn part_nominal_size(part: &PartEntry) -> u64 {
    part.size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{HashKind, SignatureKind};
    use crate::header::Header;

    fn fresh() -> Header {
        Header::new(HashKind::Sha256, SignatureKind::Ed25519)
    }

    #[test]
    fn add_then_get_part() {
        let mut h = fresh();
        h.add_part(42).unwrap();
        assert_eq!(h.get_part(42).unwrap().id, 42);
    }

    #[test]
    fn duplicate_part_id_rejected() {
        let mut h = fresh();
        h.add_part(42).unwrap();
        assert!(matches!(h.add_part(42), Err(BpakError::Exists(_))));
    }

    #[test]
    fn del_part_compacts_left() {
        let mut h = fresh();
        h.add_part(1).unwrap();
        h.add_part(2).unwrap();
        h.add_part(3).unwrap();
        h.del_part(2).unwrap();
        let ids: alloc::vec::Vec<u32> = h.foreach_part().map(|p| p.id).collect();
        assert_eq!(ids, alloc::vec![1, 3]);
    }

    #[test]
    fn parts_table_full_is_no_space() {
        let mut h = fresh();
        for i in 1..=crate::constants::N_PARTS as u32 {
            h.add_part(i).unwrap();
        }
        assert!(matches!(
            h.add_part(9999),
            Err(BpakError::NoSpace(_))
        ));
    }

    #[test]
    fn add_meta_allocates_from_pool() {
        let mut h = fresh();
        let bytes = h.add_meta(7, 0, 4).unwrap();
        bytes.copy_from_slice(&[1, 2, 3, 4]);
        let entry = *h.get_meta(7, 0).unwrap();
        assert_eq!(h.meta_bytes(&entry), &[1, 2, 3, 4]);
    }

    #[test]
    fn get_meta_distinguishes_part_ref() {
        let mut h = fresh();
        h.add_meta(7, 0, 1).unwrap();
        h.add_meta(7, 99, 1).unwrap();
        assert!(h.get_meta(7, 0).is_ok());
        assert!(h.get_meta(7, 99).is_ok());
        assert!(h.get_meta(7, 5).is_err());
    }
}
