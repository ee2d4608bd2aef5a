//! C2: the fixed-size header codec.
//!
//! The header is a 4096-byte byte-exact image: magic, version, hash/signature
//! kind, payload hash, signature slot, identity fields, and the fixed-
//! capacity meta and parts tables (spec §3). All multi-byte integers are
//! little-endian.

use crate::constants::{
    HashKind, PartFlags, SignatureKind, BPAK_MAGIC, BPAK_VERSION, HEADER_SIZE, META_DATA_POOL_SIZE,
    N_META, N_PARTS, PAYLOAD_HASH_SIZE, SIGNATURE_SIZE,
};
use crate::error::BpakError;
use crate::Result;

/// On-disk size of one [`MetaEntry`].
pub const META_ENTRY_SIZE: usize = 12;
/// On-disk size of one [`PartEntry`].
pub const PART_ENTRY_SIZE: usize = 31;

const FIXED_FIELDS_SIZE: usize = 4 // magic
    + 4 // version
    + 1 // hash_kind
    + 1 // signature_kind
    + 2 // pad0
    + PAYLOAD_HASH_SIZE
    + SIGNATURE_SIZE
    + 2 // signature_sz
    + 4 // keystore_id
    + 4 // key_id
    + 4; // alignment

const META_TABLE_SIZE: usize = N_META * META_ENTRY_SIZE;
const PARTS_TABLE_SIZE: usize = N_PARTS * PART_ENTRY_SIZE;
const USED_SIZE: usize =
    FIXED_FIELDS_SIZE + META_TABLE_SIZE + META_DATA_POOL_SIZE + PARTS_TABLE_SIZE;
const RESERVED_TAIL_SIZE: usize = HEADER_SIZE - USED_SIZE;

/// One slot of the header's fixed-capacity meta table.
///
/// An empty slot has `id == 0`; empty slots only occur at the tail of the
/// table (header invariant 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaEntry {
    /// C1 id of the meta key name.
    pub id: u32,
    /// C1 id of the part this meta is scoped to, or `0` for "global".
    pub part_id_ref: u32,
    /// Byte offset into the shared meta byte pool.
    pub data_offset: u16,
    /// Length, in bytes, of this meta's value in the pool.
    pub size: u16,
}

impl MetaEntry {
    /// An empty (unused) slot.
    pub const EMPTY: MetaEntry = MetaEntry {
        id: 0,
        part_id_ref: 0,
        data_offset: 0,
        size: 0,
    };

    /// Whether this slot is in use.
    pub const fn is_live(&self) -> bool {
        self.id != 0
    }

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.part_id_ref.to_le_bytes());
        buf[8..10].copy_from_slice(&self.data_offset.to_le_bytes());
        buf[10..12].copy_from_slice(&self.size.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        MetaEntry {
            id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            part_id_ref: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            data_offset: u16::from_le_bytes(buf[8..10].try_into().unwrap()),
            size: u16::from_le_bytes(buf[10..12].try_into().unwrap()),
        }
    }
}

impl Default for MetaEntry {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// One slot of the header's fixed-capacity parts table.
///
/// An empty slot has `id == 0`; empty slots only occur at the tail of the
/// table (header invariant 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartEntry {
    /// C1 id of the part name.
    pub id: u32,
    /// Nominal (plain) byte size of this part's payload.
    pub size: u64,
    /// On-disk byte size when [`PartFlags::TRANSPORT`] is set; otherwise unused.
    pub transport_size: u64,
    /// Byte offset of this part's body in the archive stream.
    pub offset: u64,
    /// Alignment padding bytes following the on-disk body. Must be strictly
    /// less than `alignment` (up to 4095 for the default 4096-byte
    /// alignment), hence the 16-bit width rather than 8.
    pub pad_bytes: u16,
    /// Flag bits, see [`PartFlags`].
    pub flags: u8,
}

impl PartEntry {
    /// An empty (unused) slot.
    pub const EMPTY: PartEntry = PartEntry {
        id: 0,
        size: 0,
        transport_size: 0,
        offset: 0,
        pad_bytes: 0,
        flags: 0,
    };

    /// Whether this slot is in use.
    pub const fn is_live(&self) -> bool {
        self.id != 0
    }

    /// Flags, decoded.
    pub const fn part_flags(&self) -> PartFlags {
        PartFlags::new(self.flags)
    }

    /// The on-disk byte count for this part's body: `transport_size` if
    /// [`PartFlags::TRANSPORT`] is set, else `size`.
    pub const fn on_disk_size(&self) -> u64 {
        if self.part_flags().is_transport() {
            self.transport_size
        } else {
            self.size
        }
    }

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.id.to_le_bytes());
        buf[4..12].copy_from_slice(&self.size.to_le_bytes());
        buf[12..20].copy_from_slice(&self.transport_size.to_le_bytes());
        buf[20..28].copy_from_slice(&self.offset.to_le_bytes());
        buf[28..30].copy_from_slice(&self.pad_bytes.to_le_bytes());
        buf[30] = self.flags;
    }

    fn read_from(buf: &[u8]) -> Self {
        PartEntry {
            id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            size: u64::from_le_bytes(buf[4..12].try_into().unwrap()),
            transport_size: u64::from_le_bytes(buf[12..20].try_into().unwrap()),
            offset: u64::from_le_bytes(buf[20..28].try_into().unwrap()),
            pad_bytes: u16::from_le_bytes(buf[28..30].try_into().unwrap()),
            flags: buf[30],
        }
    }
}

impl Default for PartEntry {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Where in the archive stream the header was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLocation {
    /// Header occupies the first [`crate::constants::HEADER_SIZE`] bytes;
    /// parts follow it.
    Front,
    /// Header occupies the last [`crate::constants::HEADER_SIZE`] bytes;
    /// parts precede it, starting at offset 0.
    Tail,
}

/// The parsed, in-memory form of a BPAK header.
#[derive(Debug, Clone)]
pub struct Header {
    /// Format version; must equal [`BPAK_VERSION`].
    pub version: u32,
    /// Which digest algorithm `payload_hash` was computed with.
    pub hash_kind: HashKind,
    /// Which signature scheme `signature` was produced with.
    pub signature_kind: SignatureKind,
    /// Payload digest, zero-padded if shorter than [`PAYLOAD_HASH_SIZE`].
    pub payload_hash: [u8; PAYLOAD_HASH_SIZE],
    /// Signature bytes, left-aligned and zero-padded.
    pub signature: [u8; SIGNATURE_SIZE],
    /// Number of meaningful bytes at the front of `signature`.
    pub signature_sz: u16,
    /// C1 id of the keystore the signing key belongs to.
    pub keystore_id: u32,
    /// C1 id of the signing key.
    pub key_id: u32,
    /// Physical alignment for part offsets; must be a power of two.
    pub alignment: u32,
    /// Fixed-capacity meta table.
    pub meta: [MetaEntry; N_META],
    /// Shared byte pool meta entries allocate `data_offset`/`size` ranges from.
    pub meta_data: [u8; META_DATA_POOL_SIZE],
    /// Fixed-capacity parts table.
    pub parts: [PartEntry; N_PARTS],
}

impl Header {
    /// A freshly initialized header: zeroed tables, given hash/signature
    /// kind, default alignment.
    pub fn new(hash_kind: HashKind, signature_kind: SignatureKind) -> Self {
        Header {
            version: BPAK_VERSION,
            hash_kind,
            signature_kind,
            payload_hash: [0u8; PAYLOAD_HASH_SIZE],
            signature: [0u8; SIGNATURE_SIZE],
            signature_sz: 0,
            keystore_id: 0,
            key_id: 0,
            alignment: crate::constants::DEFAULT_ALIGNMENT,
            meta: [MetaEntry::EMPTY; N_META],
            meta_data: [0u8; META_DATA_POOL_SIZE],
            parts: [PartEntry::EMPTY; N_PARTS],
        }
    }

    /// Serialize into a byte-exact, deterministic 4096-byte image.
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut pos = 0usize;

        buf[pos..pos + 4].copy_from_slice(BPAK_MAGIC);
        pos += 4;
        buf[pos..pos + 4].copy_from_slice(&self.version.to_le_bytes());
        pos += 4;
        buf[pos] = self.hash_kind.as_u8();
        pos += 1;
        buf[pos] = self.signature_kind.as_u8();
        pos += 1;
        pos += 2; // pad0, left zero
        buf[pos..pos + PAYLOAD_HASH_SIZE].copy_from_slice(&self.payload_hash);
        pos += PAYLOAD_HASH_SIZE;
        buf[pos..pos + SIGNATURE_SIZE].copy_from_slice(&self.signature);
        pos += SIGNATURE_SIZE;
        buf[pos..pos + 2].copy_from_slice(&self.signature_sz.to_le_bytes());
        pos += 2;
        buf[pos..pos + 4].copy_from_slice(&self.keystore_id.to_le_bytes());
        pos += 4;
        buf[pos..pos + 4].copy_from_slice(&self.key_id.to_le_bytes());
        pos += 4;
        buf[pos..pos + 4].copy_from_slice(&self.alignment.to_le_bytes());
        pos += 4;

        debug_assert_eq!(pos, FIXED_FIELDS_SIZE);

        for entry in self.meta.iter() {
            entry.write_to(&mut buf[pos..pos + META_ENTRY_SIZE]);
            pos += META_ENTRY_SIZE;
        }

        buf[pos..pos + META_DATA_POOL_SIZE].copy_from_slice(&self.meta_data);
        pos += META_DATA_POOL_SIZE;

        for entry in self.parts.iter() {
            entry.write_to(&mut buf[pos..pos + PART_ENTRY_SIZE]);
            pos += PART_ENTRY_SIZE;
        }

        debug_assert_eq!(pos, USED_SIZE);
        // Remaining RESERVED_TAIL_SIZE bytes stay zero.
        buf
    }

    /// Parse and validate a 4096-byte header image.
    ///
    /// Checks invariants 1-7 of the header (magic, version, recognized
    /// kinds, `signature_sz` bound, meta/parts table well-formedness, and
    /// per-entry offset/alignment arithmetic). Invariant 8 (global part
    /// ordering relative to header position) is the caller's
    /// responsibility since it depends on where in the stream this image
    /// was read from; see [`crate::tables`].
    pub fn validate(bytes: &[u8]) -> Result<Header> {
        if bytes.len() != HEADER_SIZE {
            return Err(BpakError::InvalidHeader(alloc::format!(
                "expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut pos = 0usize;

        if &bytes[0..4] != BPAK_MAGIC.as_slice() {
            return Err(BpakError::InvalidHeader("bad magic".into()));
        }
        pos += 4;

        let version = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        if version != BPAK_VERSION {
            return Err(BpakError::InvalidHeader(alloc::format!(
                "unsupported version {version}"
            )));
        }

        let hash_kind_raw = bytes[pos];
        pos += 1;
        let hash_kind = HashKind::from_u8(hash_kind_raw)
            .ok_or(BpakError::UnsupportedHash(hash_kind_raw))?;

        let signature_kind_raw = bytes[pos];
        pos += 1;
        let signature_kind = SignatureKind::from_u8(signature_kind_raw)
            .ok_or(BpakError::UnsupportedSignature(signature_kind_raw))?;

        pos += 2; // pad0

        let mut payload_hash = [0u8; PAYLOAD_HASH_SIZE];
        payload_hash.copy_from_slice(&bytes[pos..pos + PAYLOAD_HASH_SIZE]);
        pos += PAYLOAD_HASH_SIZE;

        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&bytes[pos..pos + SIGNATURE_SIZE]);
        pos += SIGNATURE_SIZE;

        let signature_sz = u16::from_le_bytes(bytes[pos..pos + 2].try_into().unwrap());
        pos += 2;
        if signature_sz as usize > SIGNATURE_SIZE {
            return Err(BpakError::InvalidHeader(alloc::format!(
                "signature_sz {signature_sz} exceeds {SIGNATURE_SIZE}"
            )));
        }

        let keystore_id = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let key_id = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let alignment = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;

        debug_assert_eq!(pos, FIXED_FIELDS_SIZE);

        let mut meta = [MetaEntry::EMPTY; N_META];
        let mut seen_empty = false;
        for slot in meta.iter_mut() {
            *slot = MetaEntry::read_from(&bytes[pos..pos + META_ENTRY_SIZE]);
            pos += META_ENTRY_SIZE;
            if slot.is_live() {
                if seen_empty {
                    return Err(BpakError::InvalidHeader(
                        "meta table has a hole before a live slot".into(),
                    ));
                }
            } else {
                seen_empty = true;
            }
        }

        let mut meta_data = [0u8; META_DATA_POOL_SIZE];
        meta_data.copy_from_slice(&bytes[pos..pos + META_DATA_POOL_SIZE]);
        pos += META_DATA_POOL_SIZE;

        // Invariant 6: ranges in range and disjoint across live slots.
        let mut ranges: alloc::vec::Vec<(u16, u16)> = alloc::vec::Vec::new();
        for slot in meta.iter().filter(|m| m.is_live()) {
            let end = slot
                .data_offset
                .checked_add(slot.size)
                .ok_or(BpakError::InvalidHeader("meta range overflow".into()))?;
            if end as usize > META_DATA_POOL_SIZE {
                return Err(BpakError::InvalidHeader(
                    "meta range exceeds data pool".into(),
                ));
            }
            for &(o, e) in ranges.iter() {
                if slot.data_offset < e && o < end {
                    return Err(BpakError::InvalidHeader(
                        "overlapping meta data ranges".into(),
                    ));
                }
            }
            ranges.push((slot.data_offset, end));
        }

        let mut parts = [PartEntry::EMPTY; N_PARTS];
        let mut seen_empty = false;
        for slot in parts.iter_mut() {
            *slot = PartEntry::read_from(&bytes[pos..pos + PART_ENTRY_SIZE]);
            pos += PART_ENTRY_SIZE;
            if slot.is_live() {
                if seen_empty {
                    return Err(BpakError::InvalidHeader(
                        "parts table has a hole before a live slot".into(),
                    ));
                }
            } else {
                seen_empty = true;
            }
        }

        debug_assert_eq!(pos, USED_SIZE);

        if alignment != 0 {
            for slot in parts.iter().filter(|p| p.is_live()) {
                if slot.offset % alignment as u64 != 0 {
                    return Err(BpakError::InvalidHeader(alloc::format!(
                        "part {:#010x} offset not aligned",
                        slot.id
                    )));
                }
                if slot.pad_bytes as u32 >= alignment {
                    return Err(BpakError::InvalidHeader(alloc::format!(
                        "part {:#010x} pad_bytes exceeds alignment",
                        slot.id
                    )));
                }
                let on_disk = slot.on_disk_size();
                if (on_disk + slot.pad_bytes as u64) % alignment as u64 != 0 {
                    return Err(BpakError::InvalidHeader(alloc::format!(
                        "part {:#010x} size+pad not alignment multiple",
                        slot.id
                    )));
                }
            }
        }

        let mut last_offset: Option<u64> = None;
        for slot in parts.iter().filter(|p| p.is_live()) {
            if let Some(prev) = last_offset {
                if slot.offset <= prev {
                    return Err(BpakError::InvalidHeader(
                        "parts are not in strictly increasing offset order".into(),
                    ));
                }
            }
            last_offset = Some(slot.offset);
        }

        Ok(Header {
            version,
            hash_kind,
            signature_kind,
            payload_hash,
            signature,
            signature_sz,
            keystore_id,
            key_id,
            alignment,
            meta,
            meta_data,
            parts,
        })
    }
}

#[cfg(feature = "std")]
mod io_ops {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write};

    impl Header {
        /// Locate and parse the header in an open archive stream: try the
        /// first [`HEADER_SIZE`] bytes first, then the last [`HEADER_SIZE`]
        /// bytes. Prefers `FRONT` when both candidates parse.
        pub fn locate<S: Read + Seek>(stream: &mut S) -> Result<(Header, HeaderLocation)> {
            let mut buf = [0u8; HEADER_SIZE];
            stream.seek(SeekFrom::Start(0))?;
            if stream.read_exact(&mut buf).is_ok() {
                if let Ok(h) = Header::validate(&buf) {
                    return Ok((h, HeaderLocation::Front));
                }
            }

            #[cfg(feature = "logging")]
            tracing::debug!("front header invalid, falling back to tail candidate");

            let len = stream.seek(SeekFrom::End(0))?;
            if len >= HEADER_SIZE as u64 {
                stream.seek(SeekFrom::Start(len - HEADER_SIZE as u64))?;
                if stream.read_exact(&mut buf).is_ok() {
                    if let Ok(h) = Header::validate(&buf) {
                        return Ok((h, HeaderLocation::Tail));
                    }
                }
            }

            #[cfg(feature = "logging")]
            tracing::warn!("no valid header at front or tail of stream");

            Err(BpakError::NotFound("no valid BPAK header found".into()))
        }

        /// Re-serialize and write this header back at its recorded
        /// location.
        ///
        /// For `Tail`, seeks to `end - sizeof(header)` and writes in place;
        /// it never seeks past the end of the stream (resolved open
        /// question, see design notes).
        pub fn write_back<S: Read + Write + Seek>(
            &self,
            stream: &mut S,
            location: HeaderLocation,
        ) -> Result<()> {
            let image = self.serialize();
            match location {
                HeaderLocation::Front => {
                    stream.seek(SeekFrom::Start(0))?;
                }
                HeaderLocation::Tail => {
                    let len = stream.seek(SeekFrom::End(0))?;
                    if len < HEADER_SIZE as u64 {
                        return Err(BpakError::SizeError(
                            "stream shorter than one header".into(),
                        ));
                    }
                    stream.seek(SeekFrom::Start(len - HEADER_SIZE as u64))?;
                }
            }
            stream.write_all(&image)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{HashKind, SignatureKind};

    #[test]
    fn layout_sums_to_header_size() {
        assert_eq!(USED_SIZE + RESERVED_TAIL_SIZE, HEADER_SIZE);
    }

    #[test]
    fn fresh_header_round_trips() {
        let h = Header::new(HashKind::Sha256, SignatureKind::Ed25519);
        let image = h.serialize();
        let parsed = Header::validate(&image).unwrap();
        assert_eq!(parsed.version, h.version);
        assert_eq!(parsed.hash_kind, h.hash_kind);
        assert_eq!(parsed.signature_kind, h.signature_kind);
        assert_eq!(parsed.alignment, h.alignment);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let h = Header::new(HashKind::Sha256, SignatureKind::Ed25519);
        let mut image = h.serialize();
        image[0] = 0;
        assert!(matches!(
            Header::validate(&image),
            Err(BpakError::InvalidHeader(_))
        ));
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(Header::validate(&[0u8; 10]).is_err());
    }

    #[test]
    fn unsupported_hash_kind_is_rejected() {
        let h = Header::new(HashKind::Sha256, SignatureKind::Ed25519);
        let mut image = h.serialize();
        image[8] = 99; // hash_kind byte offset
        assert!(matches!(
            Header::validate(&image),
            Err(BpakError::UnsupportedHash(99))
        ));
    }

    #[test]
    fn signature_does_not_affect_round_trip_shape() {
        let mut h = Header::new(HashKind::Sha256, SignatureKind::Ed25519);
        h.signature[0] = 0xAB;
        h.signature_sz = 64;
        let image = h.serialize();
        let parsed = Header::validate(&image).unwrap();
        assert_eq!(parsed.signature_sz, 64);
        assert_eq!(parsed.signature[0], 0xAB);
    }
}
