use anyhow::{Context, Result};
use colored::*;

use bpak_core::package::Package;

/// `bpak show <file>`: human-readable dump of the header, parts table, and
/// meta table.
pub fn execute(path: &str) -> Result<()> {
    let pkg = Package::open(path).with_context(|| format!("failed to open {path}"))?;
    let header = pkg.header();

    println!("{}", format!("=== {path} ===").bold());
    println!("version:         {}", header.version);
    println!("hash_kind:       {:?}", header.hash_kind);
    println!("signature_kind:  {:?}", header.signature_kind);
    println!("signature_sz:    {}", header.signature_sz);
    println!("key_id:          {:#010x}", header.key_id);
    println!("keystore_id:     {:#010x}", header.keystore_id);
    println!("alignment:       {}", header.alignment);
    println!("location:        {:?}", pkg.location());
    println!("installed_size:  {}", pkg.installed_size());
    println!("on_disk_size:    {}", pkg.on_disk_size());

    println!("\n{}", "parts:".bold());
    for part in header.foreach_part() {
        let transport = if part.part_flags().is_transport() {
            format!(" transport_size={}", part.transport_size)
        } else {
            String::new()
        };
        let excluded = if part.part_flags().is_excluded_from_hash() {
            " [excluded-from-hash]"
        } else {
            ""
        };
        println!(
            "  id={:#010x} offset={} size={} pad={}{}{}",
            part.id, part.offset, part.size, part.pad_bytes, transport, excluded
        );
    }

    println!("\n{}", "meta:".bold());
    for meta in header.foreach_meta() {
        let bytes = header.meta_bytes(meta);
        let rendered = if let Ok(s) = core::str::from_utf8(bytes) {
            if s.chars().all(|c| !c.is_control()) {
                format!("\"{s}\"")
            } else {
                hex::encode(bytes)
            }
        } else {
            hex::encode(bytes)
        };
        println!(
            "  id={:#010x} part_ref={:#010x} size={}: {}",
            meta.id, meta.part_id_ref, meta.size, rendered
        );
    }

    Ok(())
}
