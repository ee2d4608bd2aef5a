use anyhow::{Context, Result};
use colored::*;

use bpak_core::header::PartEntry;
use bpak_core::package::Package;

/// `bpak compare <a> <b>`: a read-only diff of two archives' part and meta
/// tables (supplements the distilled CLI table, SPEC_FULL.md §6.2).
/// Reports added/removed/resized parts and changed meta values; does not
/// touch either archive.
pub fn execute(a_path: &str, b_path: &str) -> Result<()> {
    let a = Package::open(a_path).with_context(|| format!("failed to open {a_path}"))?;
    let b = Package::open(b_path).with_context(|| format!("failed to open {b_path}"))?;

    println!("{}", format!("=== comparing {a_path} vs {b_path} ===").bold());

    let mut any_diff = false;

    for part in a.header().foreach_part() {
        match b.header().get_part(part.id) {
            Ok(other) => {
                if let Some(msg) = describe_part_diff(part, other) {
                    any_diff = true;
                    println!("  {} part {:#010x}: {msg}", "~".yellow(), part.id);
                }
            }
            Err(_) => {
                any_diff = true;
                println!("  {} part {:#010x} removed in {b_path}", "-".red(), part.id);
            }
        }
    }
    for part in b.header().foreach_part() {
        if a.header().get_part(part.id).is_err() {
            any_diff = true;
            println!("  {} part {:#010x} added in {b_path}", "+".green(), part.id);
        }
    }

    for meta in a.header().foreach_meta() {
        match b.header().get_meta(meta.id, meta.part_id_ref) {
            Ok(other) => {
                if a.header().meta_bytes(meta) != b.header().meta_bytes(other) {
                    any_diff = true;
                    println!(
                        "  {} meta {:#010x} (part_ref {:#010x}) changed",
                        "~".yellow(),
                        meta.id,
                        meta.part_id_ref
                    );
                }
            }
            Err(_) => {
                any_diff = true;
                println!(
                    "  {} meta {:#010x} (part_ref {:#010x}) removed in {b_path}",
                    "-".red(),
                    meta.id,
                    meta.part_id_ref
                );
            }
        }
    }
    for meta in b.header().foreach_meta() {
        if a.header().get_meta(meta.id, meta.part_id_ref).is_err() {
            any_diff = true;
            println!(
                "  {} meta {:#010x} (part_ref {:#010x}) added in {b_path}",
                "+".green(),
                meta.id,
                meta.part_id_ref
            );
        }
    }

    if !any_diff {
        println!("{} archives are structurally identical", "✓".green());
    }

    Ok(())
}

fn describe_part_diff(a: &PartEntry, b: &PartEntry) -> Option<String> {
    let mut diffs = Vec::new();
    if a.size != b.size {
        diffs.push(format!("size {} -> {}", a.size, b.size));
    }
    if a.offset != b.offset {
        diffs.push(format!("offset {} -> {}", a.offset, b.offset));
    }
    if a.flags != b.flags {
        diffs.push(format!("flags {:#04x} -> {:#04x}", a.flags, b.flags));
    }
    if diffs.is_empty() {
        None
    } else {
        Some(diffs.join(", "))
    }
}
