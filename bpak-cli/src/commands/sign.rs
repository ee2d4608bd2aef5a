use anyhow::{Context, Result};
use colored::*;
use std::path::Path;
use tracing::info;

use bpak_core::package::Package;

use super::keys::load_signer;

/// `bpak sign <file> --key <priv-pem>`
pub fn execute(path: &str, key_path: &str) -> Result<()> {
    let mut pkg = Package::open(path).with_context(|| format!("failed to open {path}"))?;
    let signature_kind = pkg.header().signature_kind;

    let signer = load_signer(Path::new(key_path), signature_kind)?;

    info!("signing {path} with {key_path} ({signature_kind:?})");
    pkg.sign(signer.as_ref())
        .with_context(|| format!("failed to sign {path}"))?;
    pkg.close()?;

    println!("{} signed {path}", "✓".green());
    Ok(())
}
