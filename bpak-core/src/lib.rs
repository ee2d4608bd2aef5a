//! # bpak-core
//!
//! Core library for BPAK ("Bit Packer"), a self-describing container format
//! for firmware and system-image artifacts: a fixed-size header holding
//! typed metadata and a table of aligned payload parts, a payload hash and
//! header signature, an authenticated Merkle tree for random-access
//! verification, and a per-part transport re-encoding (compression or
//! delta) engine.
//!
//! ## Modules
//!
//! - `constants`: format constants, limits, and enum kinds
//! - `error`: the [`BpakError`] taxonomy
//! - `id`: C1, name -> id hashing
//! - `header`: C2, the fixed-size header codec
//! - `tables`: C3, part/meta table operations
//! - `digest`: C4, payload and header hashing
//! - `signer`: C5, signature framing and concrete crypto back-ends
//! - `merkle`: C6, the salted Merkle hash tree
//! - `transport`: C7, the per-part transport codec
//! - `package`: C8, the archive façade

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod constants;
pub mod digest;
pub mod error;
pub mod header;
pub mod id;
pub mod merkle;
pub mod signer;
pub mod tables;
pub mod transport;

#[cfg(feature = "std")]
pub mod package;

pub use error::BpakError;
pub use header::{Header, MetaEntry, PartEntry};

/// Result type alias for BPAK operations.
pub type Result<T> = core::result::Result<T, BpakError>;
