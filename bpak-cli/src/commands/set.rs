use anyhow::{Context, Result};
use colored::*;

use bpak_core::id::id_from_name;
use bpak_core::package::Package;

/// `bpak set <file> --key-id <name> --keystore-id <name>`
pub fn execute(path: &str, key_id: &str, keystore_id: &str) -> Result<()> {
    let mut pkg = Package::open(path).with_context(|| format!("failed to open {path}"))?;

    pkg.header_mut().key_id = id_from_name(key_id)?;
    pkg.header_mut().keystore_id = id_from_name(keystore_id)?;
    pkg.write_header()?;
    pkg.close()?;

    println!(
        "{} set key_id={key_id} ({:#010x}), keystore_id={keystore_id}",
        "✓".green(),
        id_from_name(key_id)?
    );
    Ok(())
}
