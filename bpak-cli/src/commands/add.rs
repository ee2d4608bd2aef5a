use anyhow::{bail, Context, Result};
use colored::*;
use tracing::info;

use bpak_core::constants::{meta_keys, PartFlags, TransportAlgorithm};
use bpak_core::id::id_from_name;
use bpak_core::package::Package;

/// `bpak add <file> --part <name> [--from-file <path> | --from-string <s>]
/// [--encoder <name>] [--meta <key>=<value>] [--key-id <name>
/// --keystore-id <name>] [--exclude-from-hash]`
#[allow(clippy::too_many_arguments)]
pub fn execute(
    path: &str,
    part: Option<&str>,
    from_file: Option<&str>,
    from_string: Option<&str>,
    encoder: Option<&str>,
    meta: Option<&str>,
    exclude_from_hash: bool,
) -> Result<()> {
    let mut pkg = Package::open(path).with_context(|| format!("failed to open {path}"))?;

    match (part, from_file, from_string) {
        (Some(part_name), file, string) => {
            let bytes = match (file, string) {
                (Some(f), None) => {
                    std::fs::read(f).with_context(|| format!("failed to read {f}"))?
                }
                (None, Some(s)) => s.as_bytes().to_vec(),
                (None, None) => bail!("--part requires --from-file or --from-string"),
                (Some(_), Some(_)) => bail!("pass only one of --from-file / --from-string"),
            };

            let flags = if exclude_from_hash {
                PartFlags::EXCLUDE_FROM_HASH
            } else {
                0
            };

            info!("adding part '{part_name}' ({} bytes)", bytes.len());
            let part_id = pkg.add_part_bytes(part_name, &bytes, flags)?;

            if let Some(encoder_name) = encoder {
                let alg = TransportAlgorithm::from_id(id_from_name(encoder_name)?)
                    .ok_or_else(|| anyhow::anyhow!("unknown encoder '{encoder_name}'"))?;
                let key = id_from_name(meta_keys::BPAK_TRANSPORT)?;
                let alg_id = id_from_name(alg.name())?;
                let slot = pkg.header_mut().add_meta(key, part_id, 8)?;
                slot[0..4].copy_from_slice(&alg_id.to_le_bytes());
                slot[4..8].copy_from_slice(&alg_id.to_le_bytes());
                pkg.refresh_payload_hash()?;
                pkg.write_header()?;
            }

            println!("{} added part '{part_name}' (id {part_id:#010x})", "✓".green());
        }
        (None, _, _) => {
            let (key, value) = meta
                .and_then(|m| m.split_once('='))
                .ok_or_else(|| anyhow::anyhow!("--meta requires <key>=<value> without --part"))?;
            let id = id_from_name(key)?;
            let slot = pkg.header_mut().add_meta(id, 0, value.len() as u16)?;
            slot.copy_from_slice(value.as_bytes());
            pkg.write_header()?;
            println!("{} added meta '{key}' = '{value}'", "✓".green());
        }
    }

    pkg.close()?;
    Ok(())
}
