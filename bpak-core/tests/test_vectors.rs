//! Concrete end-to-end scenarios from the format's testable-properties
//! section (S1-S6): fixed hash/signature kind combinations, a padded part
//! layout, a Merkle companion part, tamper detection, and transport
//! idempotence.

use std::io::Write;

use bpak_core::constants::{meta_keys, HashKind, PartFlags, SignatureKind};
use bpak_core::id::id_from_name;
use bpak_core::package::Package;
use bpak_core::signer::backends::{
    Ed25519Signer, Ed25519Verifier, P256Signer, P256Verifier, P521Signer, P521Verifier,
};
use bpak_core::transport::{transport_decode, transport_encode, TransportSink};
use bpak_core::Result;
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use p256::ecdsa::SigningKey as P256SigningKey;
use p521::ecdsa::SigningKey as P521SigningKey;
use rand::rngs::OsRng;
use tempfile::NamedTempFile;

fn write_temp(bytes: &[u8]) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(bytes).unwrap();
    f
}

/// A UUID's 16 raw bytes, per `0888b0fa-9c48-4524-9845-06a641b61edd`.
fn package_uuid_bytes() -> [u8; 16] {
    [
        0x08, 0x88, 0xb0, 0xfa, 0x9c, 0x48, 0x45, 0x24, 0x98, 0x45, 0x06, 0xa6, 0x41, 0xb6, 0x1e,
        0xdd,
    ]
}

/// S1: sha256 + prime256v1, `bpak-package` UUID meta, crc32-derived
/// key-id/keystore-id, sign/verify round trip.
#[test]
fn s1_sha256_prime256v1_round_trip() {
    let archive = NamedTempFile::new().unwrap();
    let mut pkg =
        Package::create(archive.path(), HashKind::Sha256, SignatureKind::Prime256v1).unwrap();

    let package_id = id_from_name(meta_keys::BPAK_PACKAGE).unwrap();
    pkg.header_mut()
        .add_meta(package_id, 0, 16)
        .unwrap()
        .copy_from_slice(&package_uuid_bytes());

    pkg.header_mut().key_id = id_from_name("pb-development").unwrap();
    pkg.header_mut().keystore_id = id_from_name("pb-internal").unwrap();

    let signing_key = P256SigningKey::random(&mut OsRng);
    let verifying_key = *signing_key.verifying_key();
    pkg.sign(&P256Signer(signing_key)).unwrap();
    pkg.verify(&P256Verifier(verifying_key)).unwrap();

    assert_eq!(pkg.header().key_id, id_from_name("pb-development").unwrap());
    assert_eq!(pkg.header().keystore_id, id_from_name("pb-internal").unwrap());
    pkg.close().unwrap();
}

/// S2: as S1 but sha512 + secp521r1.
#[test]
fn s2_sha512_secp521r1_round_trip() {
    let archive = NamedTempFile::new().unwrap();
    let mut pkg =
        Package::create(archive.path(), HashKind::Sha512, SignatureKind::Secp521r1).unwrap();

    let package_id = id_from_name(meta_keys::BPAK_PACKAGE).unwrap();
    pkg.header_mut()
        .add_meta(package_id, 0, 16)
        .unwrap()
        .copy_from_slice(&package_uuid_bytes());

    pkg.header_mut().key_id = id_from_name("pb-development").unwrap();
    pkg.header_mut().keystore_id = id_from_name("pb-internal").unwrap();

    let signing_key = P521SigningKey::random(&mut OsRng);
    let verifying_key = *signing_key.verifying_key();
    pkg.sign(&P521Signer(signing_key)).unwrap();
    pkg.verify(&P521Verifier(verifying_key)).unwrap();
    pkg.close().unwrap();
}

/// S3: an 8193-byte part pads out to a 4096-aligned slot.
#[test]
fn s3_part_padding_and_installed_size() {
    let archive = NamedTempFile::new().unwrap();
    let mut pkg =
        Package::create(archive.path(), HashKind::Sha256, SignatureKind::Ed25519).unwrap();

    let kernel = write_temp(&vec![0x42u8; 8193]);
    pkg.add_file(kernel.path(), "kernel", 0).unwrap();

    let part = pkg.header().get_part(id_from_name("kernel").unwrap()).unwrap();
    assert_eq!(part.size, 8193);
    assert_eq!(part.pad_bytes, 4095);
    assert_eq!(part.offset, 4096);
    assert_eq!(pkg.installed_size(), 12288);
}

/// S4: a 1 MiB file's Merkle companion part carries salt and root meta
/// keyed to the part id.
#[test]
fn s4_merkle_tree_meta_present() {
    let archive = NamedTempFile::new().unwrap();
    let mut pkg =
        Package::create(archive.path(), HashKind::Sha256, SignatureKind::Ed25519).unwrap();

    let payload = vec![0x5Au8; 1024 * 1024];
    let src = write_temp(&payload);
    let part_id = pkg
        .add_file_with_merkle_tree(src.path(), "rootfs", 0)
        .unwrap();

    let salt_entry = pkg
        .header()
        .get_meta(id_from_name(meta_keys::MERKLE_SALT).unwrap(), part_id)
        .unwrap();
    assert_eq!(pkg.header().meta_bytes(salt_entry).len(), 32);

    let root_entry = pkg
        .header()
        .get_meta(id_from_name(meta_keys::MERKLE_ROOT_HASH).unwrap(), part_id)
        .unwrap();
    assert_eq!(pkg.header().meta_bytes(root_entry).len(), 32);

    let tree_part_id = id_from_name("rootfs-hash-tree").unwrap();
    assert!(pkg.header().get_part(tree_part_id).is_ok());
}

/// S5: flipping one payload byte of an S1-style signed archive is caught
/// as a payload hash mismatch on reopen.
#[test]
fn s5_tamper_at_offset_8192_is_detected() {
    use std::io::{Seek, SeekFrom};

    let archive = NamedTempFile::new().unwrap();
    let mut pkg =
        Package::create(archive.path(), HashKind::Sha256, SignatureKind::Ed25519).unwrap();

    let payload = write_temp(&vec![0x11u8; 8192]);
    pkg.add_file(payload.path(), "app", 0).unwrap();

    let signing_key = Ed25519SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    pkg.sign(&Ed25519Signer(signing_key)).unwrap();
    pkg.close().unwrap();

    let mut f = std::fs::OpenOptions::new()
        .write(true)
        .open(archive.path())
        .unwrap();
    f.seek(SeekFrom::Start(8192)).unwrap();
    f.write_all(&[0xFF]).unwrap();
    drop(f);

    let mut pkg = Package::open(archive.path()).unwrap();
    let result = pkg.verify(&Ed25519Verifier(verifying_key));
    assert!(matches!(
        result,
        Err(bpak_core::BpakError::PayloadHashMismatch)
    ));
}

/// An in-memory [`TransportSink`] for testing the codec pipeline without a
/// second file.
struct MemorySink {
    bytes: Vec<u8>,
}

impl MemorySink {
    fn new() -> Self {
        MemorySink { bytes: Vec::new() }
    }
}

impl TransportSink for MemorySink {
    fn write_output(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let end = offset as usize + bytes.len();
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[offset as usize..end].copy_from_slice(bytes);
        Ok(())
    }

    fn read_output(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write_output_header(&mut self, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// S6: transport-encoding a 1-part payload with `bpak-heatshrink` then
/// decoding reconstitutes the original bytes and header shape.
#[test]
fn s6_heatshrink_transport_round_trip() {
    let archive = NamedTempFile::new().unwrap();
    let mut pkg =
        Package::create(archive.path(), HashKind::Sha256, SignatureKind::Ed25519).unwrap();

    let original_bytes = b"the quick brown fox the quick brown fox the quick brown fox".to_vec();
    let payload = write_temp(&original_bytes);
    pkg.add_file(payload.path(), "app", 0).unwrap();

    let encode_alg = id_from_name("bpak-heatshrink").unwrap();
    let decode_alg = id_from_name("bpak-heatshrink").unwrap();
    let mut transport_meta = [0u8; 8];
    transport_meta[0..4].copy_from_slice(&encode_alg.to_le_bytes());
    transport_meta[4..8].copy_from_slice(&decode_alg.to_le_bytes());
    let app_id = id_from_name("app").unwrap();
    pkg.header_mut()
        .add_meta(id_from_name(meta_keys::BPAK_TRANSPORT).unwrap(), app_id, 8)
        .unwrap()
        .copy_from_slice(&transport_meta);

    let input_header = pkg.header().clone();
    let app_part = *pkg.header().get_part(app_id).unwrap();

    let mut encode_sink = MemorySink::new();
    let encoded_header = transport_encode(
        &input_header,
        |part| pkg.read_part_bytes(part.id),
        |_part| Ok(None),
        &mut encode_sink,
    )
    .unwrap();

    let encoded_part = *encoded_header.get_part(app_id).unwrap();
    assert!(PartFlags::new(encoded_part.flags).is_transport());

    let mut decode_sink = MemorySink::new();
    let decoded_header = transport_decode(
        &encoded_header,
        |part| {
            let start = part.offset as usize;
            let end = start + part.transport_size as usize;
            Ok(encode_sink.bytes[start..end].to_vec())
        },
        |_part| Ok(None),
        &mut decode_sink,
    )
    .unwrap();

    let decoded_part = *decoded_header.get_part(app_id).unwrap();
    assert!(!PartFlags::new(decoded_part.flags).is_transport());
    assert_eq!(decoded_part.size, app_part.size);
    assert_eq!(decoded_part.pad_bytes, app_part.pad_bytes);

    let start = decoded_part.offset as usize;
    let end = start + decoded_part.size as usize;
    assert_eq!(&decode_sink.bytes[start..end], original_bytes.as_slice());
}
