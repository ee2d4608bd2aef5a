//! Fuzzing placeholder for `bpak-core`'s header parser and transport codec.
//!
//! To use with cargo-fuzz:
//! 1. Install cargo-fuzz: cargo install cargo-fuzz
//! 2. Run fuzzer: cargo fuzz run fuzz_header

use bpak_core::constants::HEADER_SIZE;
use bpak_core::header::Header;
use bpak_core::transport::{transport_decode, TransportSink};
use bpak_core::{BpakError, Result};

/// `Header::validate` must never panic on arbitrary bytes, regardless of
/// length or content.
pub fn fuzz_header(data: &[u8]) {
    let _ = Header::validate(data);
}

/// A `TransportSink` that records writes without touching the filesystem,
/// for driving `transport_decode` against a parsed-but-untrusted header.
struct MemSink {
    buf: Vec<u8>,
}

impl TransportSink for MemSink {
    fn write_output(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let end = offset as usize + bytes.len();
        if self.buf.len() < end {
            self.buf.resize(end, 0);
        }
        self.buf[offset as usize..end].copy_from_slice(bytes);
        Ok(())
    }

    fn read_output(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = offset as usize + buf.len();
        if end > self.buf.len() {
            return Err(BpakError::Io("read past end of sink".into()));
        }
        buf.copy_from_slice(&self.buf[offset as usize..end]);
        Ok(())
    }

    fn write_output_header(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_output(0, bytes)
    }
}

/// Parses the leading [`HEADER_SIZE`] bytes as a header and, if valid,
/// drives `transport_decode` with the remaining bytes cycled in as each
/// part's "encoded" payload. Must never panic.
pub fn fuzz_transport_decode(data: &[u8]) {
    if data.len() < HEADER_SIZE {
        return;
    }
    let header = match Header::validate(&data[..HEADER_SIZE]) {
        Ok(h) => h,
        Err(_) => return,
    };
    let rest = &data[HEADER_SIZE..];
    if rest.is_empty() {
        return;
    }

    let mut sink = MemSink { buf: Vec::new() };
    let _ = transport_decode(
        &header,
        |part| {
            let len = (part.size as usize).min(rest.len()).max(1);
            Ok(rest.iter().cycle().take(len).copied().collect())
        },
        |_part| Ok(None),
        &mut sink,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuzz_header_empty() {
        fuzz_header(&[]);
    }

    #[test]
    fn fuzz_header_random_short() {
        fuzz_header(&[0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn fuzz_header_random_full_length() {
        fuzz_header(&[0xAA; HEADER_SIZE]);
    }

    #[test]
    fn fuzz_transport_decode_empty() {
        fuzz_transport_decode(&[]);
    }

    #[test]
    fn fuzz_transport_decode_random() {
        fuzz_transport_decode(&[0x5A; HEADER_SIZE + 256]);
    }
}
