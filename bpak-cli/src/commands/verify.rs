use anyhow::{Context, Result};
use colored::*;
use std::path::Path;
use tracing::info;

use bpak_core::constants::meta_keys;
use bpak_core::id::id_from_name;
use bpak_core::package::Package;
use bpak_core::BpakError;

use super::keys::load_verifier;

/// `bpak verify <file> --key <pub-der> [--part <name> --block <index>
/// --data <file>]`
///
/// With `--part`/`--block`/`--data`, additionally replays one 4 KiB block
/// of `part`'s Merkle tree (testable property 7, spec.md §8) and reports
/// whether it matches the stored root — the companion read path to
/// `add_file_with_merkle_tree` (C8).
pub fn execute(
    path: &str,
    key_path: &str,
    merkle_part: Option<&str>,
    merkle_block: Option<usize>,
    merkle_data: Option<&str>,
) -> Result<()> {
    let mut pkg = Package::open(path).with_context(|| format!("failed to open {path}"))?;
    let signature_kind = pkg.header().signature_kind;

    info!("verifying {path} with {key_path} ({signature_kind:?})");
    let verifier = load_verifier(Path::new(key_path), signature_kind)?;

    println!("\n=== Verification: {path} ===");
    match pkg.verify(verifier.as_ref()) {
        Ok(()) => {
            println!("{} signature valid", "✓".green());
        }
        Err(BpakError::PayloadHashMismatch) => {
            println!("{} payload hash mismatch", "✗".red());
            return Err(BpakError::PayloadHashMismatch.into());
        }
        Err(BpakError::InvalidSignature) => {
            println!("{} invalid signature", "✗".red());
            return Err(BpakError::InvalidSignature.into());
        }
        Err(e) => return Err(e.into()),
    }

    if let (Some(part_name), Some(block_index), Some(data_path)) =
        (merkle_part, merkle_block, merkle_data)
    {
        verify_merkle_block(&mut pkg, part_name, block_index, data_path)?;
    }

    pkg.close()?;
    Ok(())
}

fn verify_merkle_block(
    pkg: &mut Package,
    part_name: &str,
    block_index: usize,
    data_path: &str,
) -> Result<()> {
    use bpak_core::merkle::verify_block;

    let part_id = id_from_name(part_name)?;
    let part = *pkg.header().get_part(part_id)?;

    let tree_part_name = format!("{part_name}-hash-tree");
    let tree_part_id = id_from_name(&tree_part_name)?;
    let tree_bytes = pkg.read_part_bytes(tree_part_id)?;

    let salt_meta = pkg
        .header()
        .get_meta(id_from_name(meta_keys::MERKLE_SALT)?, part_id)?;
    let salt_bytes = pkg.header().meta_bytes(salt_meta);
    let mut salt = [0u8; 32];
    salt.copy_from_slice(salt_bytes);

    let root_meta = pkg
        .header()
        .get_meta(id_from_name(meta_keys::MERKLE_ROOT_HASH)?, part_id)?;
    let expected_root = pkg.header().meta_bytes(root_meta).to_vec();

    let block = std::fs::read(data_path).with_context(|| format!("failed to read {data_path}"))?;
    let leaf_count = part.size.div_ceil(4096) as usize;

    let recomputed = verify_block(&tree_bytes, leaf_count.max(1), &salt, block_index, &block)?;

    println!("\n=== Merkle block verify: {part_name}[{block_index}] ===");
    if recomputed.as_slice() == expected_root.as_slice() {
        println!("{} block matches stored root", "✓".green());
        Ok(())
    } else {
        println!("{} block does NOT match stored root", "✗".red());
        anyhow::bail!("merkle block verification failed");
    }
}
