//! End-to-end coverage of create -> add parts/meta -> sign -> verify ->
//! transport encode -> transport decode -> re-verify.

use bpak_core::constants::{HashKind, SignatureKind};
use bpak_core::id::id_from_name;
use bpak_core::package::Package;
use bpak_core::signer::backends::{Ed25519Signer, Ed25519Verifier};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tempfile::NamedTempFile;

fn write_temp(bytes: &[u8]) -> NamedTempFile {
    use std::io::Write;
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(bytes).unwrap();
    f
}

#[test]
fn create_add_sign_verify_round_trip() {
    let archive = NamedTempFile::new().unwrap();
    let mut pkg =
        Package::create(archive.path(), HashKind::Sha256, SignatureKind::Ed25519).unwrap();

    let kernel = write_temp(&vec![0xAB; 8193]);
    pkg.add_file(kernel.path(), "kernel", 0).unwrap();

    let uid_id = id_from_name("bpak-package-uid").unwrap();
    pkg.header_mut()
        .add_meta(uid_id, 0, 16)
        .unwrap()
        .copy_from_slice(b"0123456789abcdef");

    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    let signer = Ed25519Signer(signing_key);
    pkg.sign(&signer).unwrap();

    let verifier = Ed25519Verifier(verifying_key);
    pkg.verify(&verifier).unwrap();

    let part = pkg.header().get_part(id_from_name("kernel").unwrap()).unwrap();
    assert_eq!(part.size, 8193);
    assert_eq!(part.pad_bytes, 4095);
    assert_eq!(part.offset, 4096);
    assert_eq!(pkg.installed_size(), 12288);

    pkg.close().unwrap();
}

#[test]
fn tamper_detection_flags_payload_mismatch() {
    use std::io::{Seek, SeekFrom, Write};

    let archive = NamedTempFile::new().unwrap();
    let mut pkg =
        Package::create(archive.path(), HashKind::Sha256, SignatureKind::Ed25519).unwrap();

    let app = write_temp(b"firmware application bytes");
    pkg.add_file(app.path(), "app", 0).unwrap();

    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    pkg.sign(&Ed25519Signer(signing_key)).unwrap();
    pkg.close().unwrap();

    // Flip one payload byte directly on disk, past the header.
    let mut f = std::fs::OpenOptions::new()
        .write(true)
        .open(archive.path())
        .unwrap();
    f.seek(SeekFrom::Start(4096)).unwrap();
    f.write_all(&[0xFF]).unwrap();
    drop(f);

    let mut pkg = Package::open(archive.path()).unwrap();
    let verifier = Ed25519Verifier(verifying_key);
    let result = pkg.verify(&verifier);
    assert!(matches!(
        result,
        Err(bpak_core::BpakError::PayloadHashMismatch)
    ));
}

#[test]
fn merkle_tree_companion_part_verifies_every_block() {
    use bpak_core::constants::meta_keys;
    use bpak_core::merkle::verify_block;

    let archive = NamedTempFile::new().unwrap();
    let mut pkg =
        Package::create(archive.path(), HashKind::Sha256, SignatureKind::Ed25519).unwrap();

    let payload: Vec<u8> = (0u32..1_048_576).map(|i| i as u8).collect();
    let src = write_temp(&payload);
    let part_id = pkg
        .add_file_with_merkle_tree(src.path(), "rootfs", 0)
        .unwrap();

    let salt_entry = pkg
        .header()
        .get_meta(id_from_name(meta_keys::MERKLE_SALT).unwrap(), part_id)
        .unwrap();
    let salt_bytes = pkg.header().meta_bytes(salt_entry);
    let mut salt = [0u8; 32];
    salt.copy_from_slice(salt_bytes);

    let root_entry = pkg
        .header()
        .get_meta(id_from_name(meta_keys::MERKLE_ROOT_HASH).unwrap(), part_id)
        .unwrap();
    let root_bytes = pkg.header().meta_bytes(root_entry).to_vec();

    let tree_part_id = id_from_name("rootfs-hash-tree").unwrap();
    let tree_bytes = pkg.read_part_bytes(tree_part_id).unwrap();

    let n_blocks = (payload.len() + 4095) / 4096;
    for idx in 0..n_blocks {
        let start = idx * 4096;
        let end = (start + 4096).min(payload.len());
        let block = &payload[start..end];
        let root = verify_block(&tree_bytes, n_blocks, &salt, idx, block).unwrap();
        assert_eq!(root.to_vec(), root_bytes);
    }
}
