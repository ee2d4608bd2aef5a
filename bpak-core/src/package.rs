//! C8: the package façade.
//!
//! Opens and closes an archive's random-access byte stream, locates the
//! header, and drives the lower-level components (C2-C7) to add parts and
//! meta, sign, and verify. This is the only module that owns an open file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::constants::{meta_keys, HashKind, PartFlags, SignatureKind, HEADER_SIZE, IO_CHUNK_SIZE};
use crate::error::BpakError;
use crate::header::{Header, HeaderLocation};
use crate::id::id_from_name;
use crate::Result;

/// An open BPAK archive: its header image, where that header lives in the
/// stream, and the underlying random-access file.
pub struct Package {
    file: File,
    header: Header,
    location: HeaderLocation,
}

impl Package {
    /// Create a fresh archive at `path`, truncating any existing file, and
    /// write an initialized header.
    pub fn create<P: AsRef<Path>>(
        path: P,
        hash_kind: HashKind,
        signature_kind: SignatureKind,
    ) -> Result<Package> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let header = Header::new(hash_kind, signature_kind);
        file.write_all(&header.serialize())?;
        file.flush()?;
        Ok(Package {
            file,
            header,
            location: HeaderLocation::Front,
        })
    }

    /// Open an existing archive, locating its header at front or tail.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Package> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let (header, location) = Header::locate(&mut file)?;
        Ok(Package {
            file,
            header,
            location,
        })
    }

    /// Flush and release the underlying file. Dropping a [`Package`]
    /// without calling this still flushes, but errors are then
    /// unobservable.
    pub fn close(mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// The current in-memory header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The current in-memory header, mutably.
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Where the header currently lives in the stream.
    pub fn location(&self) -> HeaderLocation {
        self.location
    }

    /// Re-serialize and write the in-memory header back to its location.
    pub fn write_header(&mut self) -> Result<()> {
        self.header.write_back(&mut self.file, self.location)
    }

    /// Σ `part.size + part.pad_bytes` over live parts: the size the
    /// payload occupies once fully installed (untransported).
    pub fn installed_size(&self) -> u64 {
        self.header
            .foreach_part()
            .map(|p| p.size + p.pad_bytes as u64)
            .sum()
    }

    /// Σ `part_size(p)` over live parts, plus `sizeof(header)`: the
    /// archive's current on-disk footprint.
    pub fn on_disk_size(&self) -> u64 {
        HEADER_SIZE as u64 + self.header.foreach_part().map(|p| p.on_disk_size()).sum::<u64>()
    }

    /// Read a live part's on-disk bytes (the plain payload unless the
    /// archive is currently transport-encoded, in which case these are the
    /// transport-encoded bytes).
    pub fn read_part_bytes(&mut self, part_id: u32) -> Result<Vec<u8>> {
        let part = *self.header.get_part(part_id)?;
        let mut buf = alloc::vec![0u8; part.on_disk_size() as usize];
        self.file.seek(SeekFrom::Start(part.offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn next_part_offset(&self) -> u64 {
        let base = match self.location {
            HeaderLocation::Front => HEADER_SIZE as u64,
            HeaderLocation::Tail => 0,
        };
        self.header
            .foreach_part()
            .last()
            .map(|p| p.offset + p.on_disk_size() + p.pad_bytes as u64)
            .unwrap_or(base)
    }

    /// Append `bytes` as a new part named `part_name`, padded to the
    /// header's alignment, then refresh the payload hash and write the
    /// header back.
    pub fn add_part_bytes(&mut self, part_name: &str, bytes: &[u8], flags: u8) -> Result<u32> {
        let id = id_from_name(part_name)?;
        let offset = self.next_part_offset();
        let alignment = self.header.alignment as u64;
        let pad = if alignment == 0 {
            0
        } else {
            (alignment - (bytes.len() as u64 % alignment)) % alignment
        };

        #[cfg(feature = "logging")]
        tracing::debug!("adding part '{part_name}' ({} bytes, pad {pad})", bytes.len());

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        if pad > 0 {
            self.file.write_all(&alloc::vec![0u8; pad as usize])?;
        }

        let part = self.header.add_part(id)?;
        part.size = bytes.len() as u64;
        part.offset = offset;
        part.pad_bytes = pad as u16;
        part.flags = flags;

        self.refresh_payload_hash()?;
        self.write_header()?;
        Ok(id)
    }

    /// Append a file's contents as a new part, per
    /// [`Self::add_part_bytes`].
    pub fn add_file<P: AsRef<Path>>(&mut self, path: P, part_name: &str, flags: u8) -> Result<u32> {
        let mut f = File::open(path)?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        self.add_part_bytes(part_name, &buf, flags)
    }

    /// Embed a public key's DER body as a part, with an accompanying
    /// human-readable `bpak-key-id`/`bpak-keystore-id` meta pair.
    pub fn add_key<P: AsRef<Path>>(&mut self, der_path: P, part_name: &str) -> Result<u32> {
        let mut f = File::open(der_path)?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        self.add_part_bytes(part_name, &buf, PartFlags::EXCLUDE_FROM_HASH)
    }

    /// Add `path`'s contents as a part, then attach a companion
    /// `"<part_name>-hash-tree"` Merkle tree part, salt, and root-hash
    /// meta, and refresh the payload hash once more.
    pub fn add_file_with_merkle_tree<P: AsRef<Path>>(
        &mut self,
        path: P,
        part_name: &str,
        flags: u8,
    ) -> Result<u32> {
        let part_id = self.add_file(path, part_name, flags)?;

        let mut salt = [0u8; 32];
        getrandom_fill(&mut salt)?;

        let mut builder = crate::merkle::MerkleTreeBuilder::new(salt);
        let part = *self.header.get_part(part_id)?;
        self.file.seek(SeekFrom::Start(part.offset))?;
        let mut remaining = part.size;
        let mut buf = [0u8; IO_CHUNK_SIZE];
        while remaining > 0 {
            let take = core::cmp::min(remaining, IO_CHUNK_SIZE as u64) as usize;
            self.file.read_exact(&mut buf[..take])?;
            builder.update(&buf[..take]);
            remaining -= take as u64;
        }
        let (root, tree_bytes) = builder.finish(part.size)?;

        let tree_part_name = alloc::format!("{part_name}-hash-tree");
        self.add_part_bytes(&tree_part_name, &tree_bytes, 0)?;

        let salt_id = id_from_name(meta_keys::MERKLE_SALT)?;
        self.header.add_meta(salt_id, part_id, 32)?.copy_from_slice(&salt);
        let root_id = id_from_name(meta_keys::MERKLE_ROOT_HASH)?;
        self.header
            .add_meta(root_id, part_id, 32)?
            .copy_from_slice(&root);

        self.refresh_payload_hash()?;
        self.write_header()?;
        Ok(part_id)
    }

    /// Recompute the payload hash over all live, non-excluded parts and
    /// store it in the in-memory header. Does not write the header back;
    /// callers that mutate tables call this then [`Self::write_header`].
    pub fn refresh_payload_hash(&mut self) -> Result<()> {
        let digest = crate::digest::payload_hash(&mut self.file, &self.header, self.location)?;
        crate::digest::write_payload_hash_field(&mut self.header.payload_hash, &digest)
    }

    /// Sign the header hash with `signer` and write the resulting
    /// signature into the header.
    pub fn sign(&mut self, signer: &dyn crate::signer::Signer) -> Result<()> {
        self.refresh_payload_hash()?;
        let digest = crate::digest::header_hash(&self.header);
        let sig = signer.sign(&digest)?;
        crate::signer::write_signature(&mut self.header, &sig)?;
        #[cfg(feature = "logging")]
        tracing::debug!("signed header ({} byte signature)", sig.len());
        self.write_header()
    }

    /// Recompute the payload hash and verify the header signature with
    /// `verifier`.
    pub fn verify(&mut self, verifier: &dyn crate::signer::Verifier) -> Result<()> {
        let digest = crate::digest::payload_hash(&mut self.file, &self.header, self.location)?;
        let result = crate::signer::verify_signature(&self.header, &digest, verifier);
        #[cfg(feature = "logging")]
        if let Err(ref e) = result {
            tracing::warn!("verification failed: {e}");
        }
        result
    }
}

fn getrandom_fill(buf: &mut [u8]) -> Result<()> {
    use rand::RngCore;
    rand::rngs::OsRng.fill_bytes(buf);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{HashKind, SignatureKind};
    use tempfile::NamedTempFile;

    #[test]
    fn create_then_reopen_locates_header_at_front() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let pkg = Package::create(tmp.path(), HashKind::Sha256, SignatureKind::Ed25519).unwrap();
            pkg.close().unwrap();
        }
        let pkg = Package::open(tmp.path()).unwrap();
        assert_eq!(pkg.location(), HeaderLocation::Front);
    }

    #[test]
    fn add_file_pads_to_alignment() {
        let tmp = NamedTempFile::new().unwrap();
        let mut src = NamedTempFile::new().unwrap();
        src.write_all(&alloc::vec![0x11u8; 8193]).unwrap();

        let mut pkg = Package::create(tmp.path(), HashKind::Sha256, SignatureKind::Ed25519).unwrap();
        pkg.add_file(src.path(), "kernel", 0).unwrap();

        let part = pkg.header().get_part(id_from_name("kernel").unwrap()).unwrap();
        assert_eq!(part.size, 8193);
        assert_eq!(part.pad_bytes, 4095);
        assert_eq!(part.offset, 4096);
        assert_eq!(pkg.installed_size(), 12288);
    }

    #[test]
    #[cfg(feature = "crypto")]
    fn sign_then_verify_round_trips() {
        use ed25519_dalek::{SigningKey, VerifyingKey};
        use rand::rngs::OsRng;

        let tmp = NamedTempFile::new().unwrap();
        let mut pkg = Package::create(tmp.path(), HashKind::Sha256, SignatureKind::Ed25519).unwrap();

        let mut src = NamedTempFile::new().unwrap();
        src.write_all(b"firmware bytes").unwrap();
        pkg.add_file(src.path(), "app", 0).unwrap();

        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key: VerifyingKey = signing_key.verifying_key();

        let signer = crate::signer::backends::Ed25519Signer(signing_key);
        pkg.sign(&signer).unwrap();

        let verifier = crate::signer::backends::Ed25519Verifier(verifying_key);
        pkg.verify(&verifier).unwrap();
    }
}
