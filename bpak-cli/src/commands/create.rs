use anyhow::{Context, Result};
use colored::*;
use std::path::Path;
use tracing::info;

use bpak_core::package::Package;

use super::keys::{parse_hash_kind, parse_signature_kind};

/// `bpak create <file> [-Y] --hash-kind <k> --signature-kind <k>`
pub fn execute(path: &str, hash_kind: &str, signature_kind: &str, force: bool) -> Result<()> {
    let hash_kind = parse_hash_kind(hash_kind)?;
    let signature_kind = parse_signature_kind(signature_kind)?;

    if Path::new(path).exists() && !force {
        anyhow::bail!(
            "{} already exists; pass -Y to overwrite",
            path
        );
    }

    info!("creating {} (hash={:?}, signature={:?})", path, hash_kind, signature_kind);

    let pkg = Package::create(path, hash_kind, signature_kind)
        .with_context(|| format!("failed to create archive at {path}"))?;
    pkg.close().context("failed to finalize new archive")?;

    println!("{} created {}", "✓".green(), path);
    Ok(())
}
