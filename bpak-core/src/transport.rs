//! C7: the per-part transport codec.
//!
//! Re-encodes each live part through an algorithm selected by the
//! `bpak-transport` meta entry scoped to that part: verbatim copy,
//! heatshrink-style compression, bsdiff-style delta against an origin
//! archive, Merkle-tree regeneration, or outright removal. Output touches
//! the archive only through the three-method [`TransportSink`] capability
//! trait, so the pipeline is agnostic to what backs the output (and
//! optional origin) stream.

use alloc::vec::Vec;

use crate::constants::{PartFlags, TransportAlgorithm, IO_CHUNK_SIZE};
use crate::error::BpakError;
use crate::header::{Header, PartEntry};
use crate::Result;

/// The capability interface a transport codec back-end uses to touch the
/// output (and, for delta algorithms, its own partial output) stream.
///
/// All three hooks are pure offset-based random access; there is no
/// implicit cursor.
pub trait TransportSink {
    /// Write `bytes` at `offset` in the output stream.
    fn write_output(&mut self, offset: u64, bytes: &[u8]) -> Result<()>;
    /// Read `buf.len()` bytes starting at `offset` from the output stream.
    ///
    /// Delta algorithms use this to read back their own already-written
    /// partial output.
    fn read_output(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;
    /// Mutate the in-memory output header image.
    ///
    /// Fires when a back-end needs to add or change header state beyond
    /// its own part's table entry (e.g. Merkle regeneration writing new
    /// meta entries). `bytes` must be exactly
    /// [`crate::constants::HEADER_SIZE`] long.
    fn write_output_header(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Per-part decode/encode progress, mirroring the spec's
/// `start -> RUNNING -> finish -> DONE` state machine. The back-ends in
/// this module buffer a part's bytes in `RUNNING` and do their real work
/// in `finish`, since none of the four algorithms require true one-pass
/// streaming to be correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Done,
}

/// Drives one part through an encode or decode algorithm.
pub struct PartCodec {
    algorithm: TransportAlgorithm,
    buffer: Vec<u8>,
    phase: Phase,
}

impl PartCodec {
    /// Reset the codec for a new part.
    pub fn start(algorithm: TransportAlgorithm) -> Self {
        PartCodec {
            algorithm,
            buffer: Vec::new(),
            phase: Phase::Running,
        }
    }

    /// Feed the next chunk of this part's bytes.
    pub fn write_chunk(&mut self, bytes: &[u8]) -> Result<()> {
        if self.phase != Phase::Running {
            return Err(BpakError::Failed("write_chunk after finish".into()));
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Flush trailing state and run the algorithm, returning the encoded
    /// (encode direction) or reconstituted (decode direction) bytes.
    pub fn finish_encode(mut self, origin: Option<&[u8]>) -> Result<Vec<u8>> {
        self.phase = Phase::Done;
        match self.algorithm {
            TransportAlgorithm::Identity => Ok(self.buffer),
            TransportAlgorithm::Heatshrink => Ok(codecs::heatshrink::compress(&self.buffer)),
            TransportAlgorithm::Bsdiff => {
                Ok(codecs::bsdiff::diff(origin.unwrap_or(&[]), &self.buffer))
            }
            TransportAlgorithm::MerkleGenerate | TransportAlgorithm::RemoveData => Ok(Vec::new()),
        }
    }

    /// Reverse of [`Self::finish_encode`]: reconstitute the plain part
    /// bytes from encoded bytes buffered via [`Self::write_chunk`].
    ///
    /// `nominal_size` is the part's declared (plain) size. `RemoveData`
    /// cannot reconstruct the original content by design; it yields
    /// `nominal_size` zero bytes. `MerkleGenerate` is handled outside this
    /// method by [`decode_part`], since it needs the sibling part's
    /// already-decoded bytes rather than its own encoded bytes.
    pub fn finish_decode(mut self, origin: Option<&[u8]>, nominal_size: u64) -> Result<Vec<u8>> {
        self.phase = Phase::Done;
        match self.algorithm {
            TransportAlgorithm::Identity => Ok(self.buffer),
            TransportAlgorithm::Heatshrink => codecs::heatshrink::decompress(&self.buffer),
            TransportAlgorithm::Bsdiff => {
                codecs::bsdiff::patch(origin.unwrap_or(&[]), &self.buffer)
            }
            TransportAlgorithm::RemoveData => Ok(alloc::vec![0u8; nominal_size as usize]),
            TransportAlgorithm::MerkleGenerate => Ok(Vec::new()),
        }
    }
}

/// Concrete codec back-ends. Byte-exact compatibility with the reference
/// heatshrink/bsdiff tools is explicitly out of scope (spec §1); these
/// only need to be reversible within this crate.
pub mod codecs {
    /// A pure-Rust LZSS-style byte-stream compressor in the spirit of
    /// heatshrink: a sliding window, hashed 4-byte match starts, and a
    /// literal/match token stream.
    pub mod heatshrink {
        use alloc::collections::BTreeMap;
        use alloc::vec::Vec;

        use crate::error::BpakError;
        use crate::Result;

        const MIN_MATCH: usize = 4;
        const MAX_MATCH: usize = 1028;
        const WINDOW: usize = 1 << 15;

        fn key_at(data: &[u8], i: usize) -> u32 {
            u32::from_le_bytes(data[i..i + 4].try_into().unwrap())
        }

        /// Compress `data` into a token stream of literal runs
        /// (`0x00, len:u32, bytes`) and back-references
        /// (`0x01, distance:u32, len:u32`).
        pub fn compress(data: &[u8]) -> Vec<u8> {
            let mut out = Vec::new();
            let mut table: BTreeMap<u32, usize> = BTreeMap::new();
            let n = data.len();
            let mut i = 0usize;
            let mut literal_start = 0usize;

            while i + MIN_MATCH <= n {
                let key = key_at(data, i);
                let mut matched = false;
                if let Some(&prev) = table.get(&key) {
                    if i - prev <= WINDOW {
                        let mut len = 0usize;
                        while i + len < n && data[prev + len] == data[i + len] && len < MAX_MATCH {
                            len += 1;
                        }
                        if len >= MIN_MATCH {
                            flush_literal(&mut out, data, literal_start, i);
                            out.push(1);
                            out.extend_from_slice(&((i - prev) as u32).to_le_bytes());
                            out.extend_from_slice(&(len as u32).to_le_bytes());
                            table.insert(key, i);
                            i += len;
                            literal_start = i;
                            matched = true;
                        }
                    }
                }
                if !matched {
                    table.insert(key, i);
                    i += 1;
                }
            }
            flush_literal(&mut out, data, literal_start, n);
            out
        }

        fn flush_literal(out: &mut Vec<u8>, data: &[u8], start: usize, end: usize) {
            if end > start {
                out.push(0);
                out.extend_from_slice(&((end - start) as u32).to_le_bytes());
                out.extend_from_slice(&data[start..end]);
            }
        }

        /// Reverse of [`compress`].
        pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
            let mut out = Vec::new();
            let mut pos = 0usize;
            while pos < data.len() {
                let tag = data[pos];
                pos += 1;
                match tag {
                    0 => {
                        let len = read_u32(data, &mut pos)? as usize;
                        if pos + len > data.len() {
                            return Err(BpakError::Failed("truncated literal run".into()));
                        }
                        out.extend_from_slice(&data[pos..pos + len]);
                        pos += len;
                    }
                    1 => {
                        let dist = read_u32(data, &mut pos)? as usize;
                        let len = read_u32(data, &mut pos)? as usize;
                        if dist == 0 || dist > out.len() {
                            return Err(BpakError::Failed("bad back-reference distance".into()));
                        }
                        let start = out.len() - dist;
                        for k in 0..len {
                            let b = out[start + k];
                            out.push(b);
                        }
                    }
                    _ => return Err(BpakError::Failed("unknown heatshrink token".into())),
                }
            }
            Ok(out)
        }

        fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32> {
            if *pos + 4 > data.len() {
                return Err(BpakError::Failed("truncated heatshrink stream".into()));
            }
            let v = u32::from_le_bytes(data[*pos..*pos + 4].try_into().unwrap());
            *pos += 4;
            Ok(v)
        }
    }

    /// A bsdiff-style block delta: `new` is split into fixed-size blocks;
    /// each is emitted either as a `Copy` from an identical block anywhere
    /// in `origin`, or as a literal `Insert`.
    pub mod bsdiff {
        use alloc::collections::BTreeMap;
        use alloc::vec::Vec;

        use crate::error::BpakError;
        use crate::Result;

        const BLOCK: usize = 256;
        const TAG_COPY: u8 = 0;
        const TAG_INSERT: u8 = 1;

        /// Produce a patch turning `origin` into `new`.
        pub fn diff(origin: &[u8], new: &[u8]) -> Vec<u8> {
            let mut index: BTreeMap<&[u8], u64> = BTreeMap::new();
            let mut i = 0usize;
            while i + BLOCK <= origin.len() {
                index.entry(&origin[i..i + BLOCK]).or_insert(i as u64);
                i += BLOCK;
            }

            let mut out = Vec::new();
            let mut pos = 0usize;
            while pos < new.len() {
                let end = (pos + BLOCK).min(new.len());
                let chunk = &new[pos..end];
                if chunk.len() == BLOCK {
                    if let Some(&origin_off) = index.get(chunk) {
                        out.push(TAG_COPY);
                        out.extend_from_slice(&origin_off.to_le_bytes());
                        out.extend_from_slice(&(BLOCK as u64).to_le_bytes());
                        pos = end;
                        continue;
                    }
                }
                out.push(TAG_INSERT);
                out.extend_from_slice(&(chunk.len() as u64).to_le_bytes());
                out.extend_from_slice(chunk);
                pos = end;
            }
            out
        }

        /// Apply a patch produced by [`diff`] against the same `origin`.
        pub fn patch(origin: &[u8], patch_bytes: &[u8]) -> Result<Vec<u8>> {
            let mut out = Vec::new();
            let mut pos = 0usize;
            while pos < patch_bytes.len() {
                let tag = patch_bytes[pos];
                pos += 1;
                match tag {
                    TAG_COPY => {
                        let off = read_u64(patch_bytes, &mut pos)?;
                        let len = read_u64(patch_bytes, &mut pos)? as usize;
                        let off = off as usize;
                        if off + len > origin.len() {
                            return Err(BpakError::Failed("copy range exceeds origin".into()));
                        }
                        out.extend_from_slice(&origin[off..off + len]);
                    }
                    TAG_INSERT => {
                        let len = read_u64(patch_bytes, &mut pos)? as usize;
                        if pos + len > patch_bytes.len() {
                            return Err(BpakError::Failed("truncated insert".into()));
                        }
                        out.extend_from_slice(&patch_bytes[pos..pos + len]);
                        pos += len;
                    }
                    _ => return Err(BpakError::Failed("unknown bsdiff token".into())),
                }
            }
            Ok(out)
        }

        fn read_u64(data: &[u8], pos: &mut usize) -> Result<u64> {
            if *pos + 8 > data.len() {
                return Err(BpakError::Failed("truncated bsdiff stream".into()));
            }
            let v = u64::from_le_bytes(data[*pos..*pos + 8].try_into().unwrap());
            *pos += 8;
            Ok(v)
        }
    }
}

fn round_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    let rem = value % alignment;
    if rem == 0 {
        value
    } else {
        value + (alignment - rem)
    }
}

/// Run transport encode over every live part of `input_header`, reading
/// plain bytes via `read_part` and depositing encoded bytes via `sink`.
/// Returns the output header with rewritten offsets, `transport_size`,
/// and the `TRANSPORT` flag set on every part whose on-disk form changed.
///
/// `read_part(part) -> Vec<u8>` and `read_origin(part) -> Option<Vec<u8>>`
/// abstract over wherever the input/origin archives are backed (a file,
/// an in-memory buffer); only `sink` is touched through [`TransportSink`].
pub fn transport_encode<S: TransportSink>(
    input_header: &Header,
    mut read_part: impl FnMut(&PartEntry) -> Result<Vec<u8>>,
    mut read_origin: impl FnMut(&PartEntry) -> Result<Option<Vec<u8>>>,
    sink: &mut S,
) -> Result<Header> {
    let mut out_header = input_header.clone();
    let mut cursor = crate::constants::HEADER_SIZE as u64;

    for (idx, part) in input_header.foreach_part().enumerate() {
        let algorithm = select_algorithm(input_header, part, true)?;
        #[cfg(feature = "logging")]
        tracing::debug!("transport-encoding part {:#010x} with {algorithm:?}", part.id);
        let plain = read_part(part)?;
        let origin = read_origin(part)?;

        let mut codec = PartCodec::start(algorithm);
        codec.write_chunk(&plain)?;
        let encoded = codec.finish_encode(origin.as_deref())?;

        let offset = round_up(cursor, input_header.alignment as u64);
        sink.write_output(offset, &encoded)?;

        let out_part = &mut out_header.parts[idx];
        out_part.offset = offset;
        out_part.transport_size = encoded.len() as u64;
        out_part.flags = PartFlags::new(out_part.flags).with_transport(true).as_u8();

        let on_disk = encoded.len() as u64;
        let padded = round_up(on_disk, input_header.alignment as u64);
        out_part.pad_bytes = (padded - on_disk) as u16;
        cursor = offset + padded;
    }

    Ok(out_header)
}

/// Run transport decode, the reverse of [`transport_encode`]: reads each
/// part's transport-encoded bytes, reconstitutes its plain bytes, and
/// deposits them at the part's nominal offset via `sink`.
pub fn transport_decode<S: TransportSink>(
    input_header: &Header,
    mut read_encoded: impl FnMut(&PartEntry) -> Result<Vec<u8>>,
    mut read_origin: impl FnMut(&PartEntry) -> Result<Option<Vec<u8>>>,
    sink: &mut S,
) -> Result<Header> {
    let mut out_header = input_header.clone();
    let mut cursor = crate::constants::HEADER_SIZE as u64;
    let mut decoded_cache: alloc::collections::BTreeMap<u32, Vec<u8>> =
        alloc::collections::BTreeMap::new();

    for (idx, part) in input_header.foreach_part().enumerate() {
        let algorithm = select_algorithm(input_header, part, false)?;
        #[cfg(feature = "logging")]
        tracing::debug!("transport-decoding part {:#010x} with {algorithm:?}", part.id);

        let plain = if algorithm == TransportAlgorithm::MerkleGenerate {
            regenerate_merkle_part(input_header, idx, &decoded_cache)?
        } else {
            let encoded = read_encoded(part)?;
            let origin = read_origin(part)?;
            let mut codec = PartCodec::start(algorithm);
            codec.write_chunk(&encoded)?;
            codec.finish_decode(origin.as_deref(), part.size)?
        };

        let offset = round_up(cursor, input_header.alignment as u64);
        sink.write_output(offset, &plain)?;
        decoded_cache.insert(part.id, plain.clone());

        let out_part = &mut out_header.parts[idx];
        out_part.offset = offset;
        out_part.transport_size = 0;
        out_part.flags = PartFlags::new(out_part.flags).with_transport(false).as_u8();

        let padded = round_up(plain.len() as u64, input_header.alignment as u64);
        out_part.pad_bytes = (padded - plain.len() as u64) as u16;
        cursor = offset + padded;
    }

    Ok(out_header)
}

fn select_algorithm(header: &Header, part: &PartEntry, encode: bool) -> Result<TransportAlgorithm> {
    let meta = match header.get_meta(
        crate::id::id_from_name(crate::constants::meta_keys::BPAK_TRANSPORT)?,
        part.id,
    ) {
        Ok(m) => m,
        Err(_) => return Ok(TransportAlgorithm::Identity),
    };
    let bytes = header.meta_bytes(meta);
    if bytes.len() < 8 {
        return Err(BpakError::InvalidHeader(
            "bpak-transport meta malformed".into(),
        ));
    }
    let encode_alg = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let decode_alg = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let id = if encode { encode_alg } else { decode_alg };
    TransportAlgorithm::from_id(id)
        .ok_or_else(|| BpakError::Failed(alloc::format!("unknown transport algorithm id {id:#x}")))
}

fn regenerate_merkle_part(
    header: &Header,
    hash_tree_idx: usize,
    decoded_cache: &alloc::collections::BTreeMap<u32, Vec<u8>>,
) -> Result<Vec<u8>> {
    // `add_file_with_merkle_tree` always inserts the hash-tree part
    // immediately after its data part, so the sibling is the previous live
    // slot in table order, not any other previously decoded part. Its id
    // (not the hash-tree part's id) is what `merkle-salt`/`merkle-root-hash`
    // are scoped to, since the name-to-id hash is one-way and the
    // "-hash-tree" suffix can't be stripped back off an id to recover it.
    let sibling = hash_tree_idx
        .checked_sub(1)
        .and_then(|i| header.foreach_part().nth(i))
        .ok_or_else(|| {
            BpakError::Failed("merkle-generate part has no preceding sibling part".into())
        })?;

    let sibling_bytes = decoded_cache.get(&sibling.id).ok_or_else(|| {
        BpakError::Failed("merkle-generate sibling part not yet decoded".into())
    })?;

    let salt_meta = header.get_meta(
        crate::id::id_from_name(crate::constants::meta_keys::MERKLE_SALT)?,
        sibling.id,
    )?;
    let salt_bytes = header.meta_bytes(salt_meta);
    let mut salt = [0u8; 32];
    salt[..salt_bytes.len().min(32)].copy_from_slice(&salt_bytes[..salt_bytes.len().min(32)]);

    let mut builder = crate::merkle::MerkleTreeBuilder::new(salt);
    for chunk in sibling_bytes.chunks(IO_CHUNK_SIZE) {
        builder.update(chunk);
    }
    let (_root, tree_bytes) = builder.finish(sibling_bytes.len() as u64)?;
    Ok(tree_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heatshrink_round_trips() {
        let data = b"abcabcabcabcabcabcabcabcabcabc the quick brown fox the quick brown fox";
        let compressed = codecs::heatshrink::compress(data);
        let restored = codecs::heatshrink::decompress(&compressed).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn heatshrink_round_trips_random_looking_data() {
        let data: alloc::vec::Vec<u8> = (0u32..600).map(|i| (i * 2654435761) as u8).collect();
        let compressed = codecs::heatshrink::compress(&data);
        let restored = codecs::heatshrink::decompress(&compressed).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn bsdiff_round_trips() {
        let origin = alloc::vec![7u8; 4096];
        let mut new = origin.clone();
        new[100] = 0xFF;
        new.extend_from_slice(b"trailing new content");
        let patch = codecs::bsdiff::diff(&origin, &new);
        let restored = codecs::bsdiff::patch(&origin, &patch).unwrap();
        assert_eq!(restored, new);
    }

    #[test]
    fn identity_codec_passes_through() {
        let codec = PartCodec::start(TransportAlgorithm::Identity);
        let mut c = codec;
        c.write_chunk(b"hello").unwrap();
        assert_eq!(c.finish_encode(None).unwrap(), b"hello");
    }

    #[test]
    fn remove_data_encode_is_empty_and_decode_is_zero_filled() {
        let mut enc = PartCodec::start(TransportAlgorithm::RemoveData);
        enc.write_chunk(b"secret").unwrap();
        assert_eq!(enc.finish_encode(None).unwrap(), alloc::vec::Vec::<u8>::new());

        let dec = PartCodec::start(TransportAlgorithm::RemoveData);
        assert_eq!(dec.finish_decode(None, 6).unwrap(), alloc::vec![0u8; 6]);
    }
}
