//! C4: payload and header digest engine.
//!
//! Both hashes dispatch on [`HashKind`] to the matching `sha2` digest.
//! Header hashing zeroes `signature`/`signature_sz` before feeding the
//! 4096-byte image and restores them afterward — callers only ever see the
//! header unchanged; the zeroing happens on a scratch copy.

use alloc::vec::Vec;
use sha2::Digest;

use crate::constants::{HashKind, PAYLOAD_HASH_SIZE, SIGNATURE_SIZE};
use crate::error::BpakError;
use crate::header::Header;
use crate::Result;

enum DynHasher {
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl DynHasher {
    fn new(kind: HashKind) -> Self {
        match kind {
            HashKind::Sha256 => DynHasher::Sha256(sha2::Sha256::new()),
            HashKind::Sha384 => DynHasher::Sha384(sha2::Sha384::new()),
            HashKind::Sha512 => DynHasher::Sha512(sha2::Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            DynHasher::Sha256(h) => Digest::update(h, data),
            DynHasher::Sha384(h) => Digest::update(h, data),
            DynHasher::Sha512(h) => Digest::update(h, data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            DynHasher::Sha256(h) => h.finalize().to_vec(),
            DynHasher::Sha384(h) => h.finalize().to_vec(),
            DynHasher::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// Hash an arbitrary byte slice with the digest `kind` selects.
pub fn hash_bytes(kind: HashKind, data: &[u8]) -> Vec<u8> {
    let mut h = DynHasher::new(kind);
    h.update(data);
    h.finalize()
}

/// The header hash: the 4096-byte header image with `signature` and
/// `signature_sz` zeroed, fed through `header.hash_kind`'s digest.
///
/// This is the value C5 actually signs/verifies.
pub fn header_hash(header: &Header) -> Vec<u8> {
    let mut scratch = header.clone();
    scratch.signature = [0u8; SIGNATURE_SIZE];
    scratch.signature_sz = 0;
    let image = scratch.serialize();
    hash_bytes(header.hash_kind, &image)
}

/// Copy `digest` into a fixed [`PAYLOAD_HASH_SIZE`]-byte field, zero-padded
/// if shorter.
///
/// Fails with [`BpakError::BufferTooSmall`] if `digest` is longer than the
/// field.
pub fn write_payload_hash_field(
    out: &mut [u8; PAYLOAD_HASH_SIZE],
    digest: &[u8],
) -> Result<()> {
    if digest.len() > PAYLOAD_HASH_SIZE {
        return Err(BpakError::BufferTooSmall {
            needed: digest.len(),
            got: PAYLOAD_HASH_SIZE,
        });
    }
    *out = [0u8; PAYLOAD_HASH_SIZE];
    out[..digest.len()].copy_from_slice(digest);
    Ok(())
}

#[cfg(feature = "std")]
mod streaming {
    use super::*;
    use crate::header::HeaderLocation;
    use std::io::{Read, Seek, SeekFrom};

    const CHUNK_SIZE: usize = crate::constants::IO_CHUNK_SIZE;

    /// The payload hash over a package's live, non-excluded parts.
    ///
    /// Seeks to each part's declared `offset` (skipping pad bytes and any
    /// gap between parts) and, unless `EXCLUDE_FROM_HASH` is set, feeds
    /// exactly `part_size(part)` bytes through the digest in ≤4 KiB chunks.
    /// Excluded parts are skipped without being read.
    pub fn payload_hash<S: Read + Seek>(
        stream: &mut S,
        header: &Header,
        _location: HeaderLocation,
    ) -> Result<Vec<u8>> {
        let mut hasher = DynHasher::new(header.hash_kind);
        let mut buf = [0u8; CHUNK_SIZE];

        for part in header.foreach_part() {
            let flags = part.part_flags();
            let on_disk = part.on_disk_size();

            if flags.is_excluded_from_hash() {
                continue;
            }

            stream
                .seek(SeekFrom::Start(part.offset))
                .map_err(BpakError::from)?;

            let mut remaining = on_disk;
            while remaining > 0 {
                let take = core::cmp::min(remaining, CHUNK_SIZE as u64) as usize;
                stream
                    .read_exact(&mut buf[..take])
                    .map_err(BpakError::from)?;
                hasher.update(&buf[..take]);
                remaining -= take as u64;
            }
        }

        Ok(hasher.finalize())
    }
}

#[cfg(feature = "std")]
pub use streaming::payload_hash;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SignatureKind;

    #[test]
    fn header_hash_ignores_signature_bytes() {
        let mut h = Header::new(HashKind::Sha256, SignatureKind::Ed25519);
        let base = header_hash(&h);
        h.signature[0] = 0xFF;
        h.signature_sz = 10;
        let after = header_hash(&h);
        assert_eq!(base, after);
    }

    #[test]
    fn header_hash_changes_with_version_or_kind() {
        let h1 = Header::new(HashKind::Sha256, SignatureKind::Ed25519);
        let mut h2 = h1.clone();
        h2.keystore_id = 123;
        assert_ne!(header_hash(&h1), header_hash(&h2));
    }

    #[test]
    fn digest_sizes_match_hash_kind() {
        assert_eq!(hash_bytes(HashKind::Sha256, b"x").len(), 32);
        assert_eq!(hash_bytes(HashKind::Sha384, b"x").len(), 48);
        assert_eq!(hash_bytes(HashKind::Sha512, b"x").len(), 64);
    }
}
