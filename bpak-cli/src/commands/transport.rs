use anyhow::{Context, Result};
use colored::*;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::info;

use bpak_core::constants::HEADER_SIZE;
use bpak_core::header::{Header, HeaderLocation};
use bpak_core::package::Package;
use bpak_core::transport::{transport_decode, transport_encode, TransportSink};
use bpak_core::{BpakError, Result as BpakResult};

/// Drives the three [`TransportSink`] hooks against a single random-access
/// output file, per spec.md §4.7: offset-based writes/reads, no implicit
/// cursor.
struct FileSink {
    file: File,
}

impl TransportSink for FileSink {
    fn write_output(&mut self, offset: u64, bytes: &[u8]) -> BpakResult<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(BpakError::from)?;
        self.file.write_all(bytes).map_err(BpakError::from)
    }

    fn read_output(&mut self, offset: u64, buf: &mut [u8]) -> BpakResult<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(BpakError::from)?;
        self.file.read_exact(buf).map_err(BpakError::from)
    }

    fn write_output_header(&mut self, bytes: &[u8]) -> BpakResult<()> {
        if bytes.len() != HEADER_SIZE {
            return Err(BpakError::SizeError(format!(
                "header write of {} bytes, expected {HEADER_SIZE}",
                bytes.len()
            )));
        }
        self.write_output(0, bytes)
    }
}

/// `bpak transport <input> <output> [--origin <origin>] (--encode|--decode)`
pub fn execute(input: &str, output: &str, origin: Option<&str>, encode: bool) -> Result<()> {
    let mut input_pkg = Package::open(input).with_context(|| format!("failed to open {input}"))?;
    let mut origin_pkg = origin
        .map(Package::open)
        .transpose()
        .context("failed to open origin archive")?;

    let output_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(output)
        .with_context(|| format!("failed to create {output}"))?;
    let mut sink = FileSink { file: output_file };

    let input_header = input_pkg.header().clone();

    let out_header = if encode {
        info!("transport-encoding {input} -> {output}");
        transport_encode(
            &input_header,
            |part| input_pkg.read_part_bytes(part.id),
            |part| match &mut origin_pkg {
                Some(p) => p.read_part_bytes(part.id).map(Some),
                None => Ok(None),
            },
            &mut sink,
        )?
    } else {
        info!("transport-decoding {input} -> {output}");
        transport_decode(
            &input_header,
            |part| input_pkg.read_part_bytes(part.id),
            |part| match &mut origin_pkg {
                Some(p) => p.read_part_bytes(part.id).map(Some),
                None => Ok(None),
            },
            &mut sink,
        )?
    };

    // Recompute the payload hash of the *output* archive's on-disk bytes
    // and fold it into the header before the final write (spec.md §4.7
    // step 5 / decode step 4's "re-issue payload hash ... externally").
    let mut out_header = out_header;
    let digest = bpak_core::digest::payload_hash(&mut sink.file, &out_header, HeaderLocation::Front)?;
    bpak_core::digest::write_payload_hash_field(&mut out_header.payload_hash, &digest)?;

    out_header.write_back(&mut sink.file, HeaderLocation::Front)?;
    sink.file.flush()?;

    println!(
        "{} transport-{} {input} -> {output}",
        "✓".green(),
        if encode { "encoded" } else { "decoded" }
    );
    Ok(())
}
