//! Error types for BPAK operations

use alloc::string::String;
#[cfg(feature = "std")]
use alloc::string::ToString;

/// Errors that can occur during BPAK container operations
///
/// Mirrors the negative-integer error taxonomy of the reference tool
/// (spec §7) as a tagged enum.
#[cfg_attr(feature = "std", derive(thiserror::Error))]
#[derive(Debug, Clone, PartialEq)]
pub enum BpakError {
    /// An argument was invalid (e.g. an empty name passed to the id hasher)
    #[cfg_attr(feature = "std", error("invalid argument: {0}"))]
    InvalidArgument(String),

    /// File or header not found
    #[cfg_attr(feature = "std", error("not found: {0}"))]
    NotFound(String),

    /// Magic, version, or kind fields are out of spec
    #[cfg_attr(feature = "std", error("invalid header: {0}"))]
    InvalidHeader(String),

    /// Parts table, meta table, or meta byte pool is full
    #[cfg_attr(feature = "std", error("no space: {0}"))]
    NoSpace(String),

    /// Attempted to insert a part/meta id that already has a live slot
    #[cfg_attr(feature = "std", error("already exists: {0}"))]
    Exists(String),

    /// I/O fault during read/write/seek
    #[cfg_attr(feature = "std", error("io error: {0}"))]
    Io(String),

    /// A hook received a byte range of unexpected length
    #[cfg_attr(feature = "std", error("size error: {0}"))]
    SizeError(String),

    /// `hash_kind` is not a recognized enum value
    #[cfg_attr(feature = "std", error("unsupported hash kind: {0}"))]
    UnsupportedHash(u8),

    /// `signature_kind` is not a recognized enum value
    #[cfg_attr(feature = "std", error("unsupported signature kind: {0}"))]
    UnsupportedSignature(u8),

    /// The caller's output buffer is shorter than the digest
    #[cfg_attr(feature = "std", error("buffer too small: need {needed}, got {got}"))]
    BufferTooSmall {
        /// Bytes required.
        needed: usize,
        /// Bytes actually provided.
        got: usize,
    },

    /// Recomputed payload hash does not match the header's stored value
    #[cfg_attr(feature = "std", error("payload hash mismatch"))]
    PayloadHashMismatch,

    /// The external verifier rejected the signature
    #[cfg_attr(feature = "std", error("invalid signature"))]
    InvalidSignature,

    /// Catch-all for back-end (codec/crypto) failures
    #[cfg_attr(feature = "std", error("failed: {0}"))]
    Failed(String),
}

#[cfg(feature = "std")]
impl From<std::io::Error> for BpakError {
    fn from(err: std::io::Error) -> Self {
        BpakError::Io(err.to_string())
    }
}
