//! Constants and limits for the BPAK container format

use serde::{Deserialize, Serialize};

/// Header marker - 4 bytes for synchronization ("BPAK")
pub const BPAK_MAGIC: &[u8; 4] = b"BPAK";

/// Current protocol version
pub const BPAK_VERSION: u32 = 2;

/// Total size of the on-disk header, in bytes
pub const HEADER_SIZE: usize = 4096;

/// Number of meta slots in the header's fixed-capacity meta table
pub const N_META: usize = 32;

/// Number of part slots in the header's fixed-capacity parts table
pub const N_PARTS: usize = 32;

/// Size, in bytes, of the shared meta byte pool all meta slots allocate from
pub const META_DATA_POOL_SIZE: usize = 2048;

/// Size of the `payload_hash` field, zero-padded if the hash is shorter
pub const PAYLOAD_HASH_SIZE: usize = 64;

/// Size of the `signature` field, zero-padded; only the first `signature_sz`
/// bytes are meaningful
pub const SIGNATURE_SIZE: usize = 512;

/// Default physical alignment for part offsets
pub const DEFAULT_ALIGNMENT: u32 = 4096;

/// Size of a Merkle tree block and leaf hash domain (spec §4.6)
pub const MERKLE_BLOCK_SIZE: usize = 4096;

/// Fan-out of one Merkle tree level: one 4096-byte block of a level holds
/// this many 32-byte child hashes
pub const MERKLE_FANOUT: usize = 128;

/// Size of a Merkle tree random salt, in bytes
pub const MERKLE_SALT_SIZE: usize = 32;

/// Chunk size used when streaming payload bytes through the hash engine or
/// the transport codec
pub const IO_CHUNK_SIZE: usize = 4096;

/// Supported header digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum HashKind {
    /// SHA-256 (32-byte digest)
    Sha256 = 1,
    /// SHA-384 (48-byte digest)
    Sha384 = 2,
    /// SHA-512 (64-byte digest)
    Sha512 = 3,
}

impl HashKind {
    /// Size of the digest this hash kind produces, in bytes
    pub const fn digest_size(&self) -> usize {
        match self {
            HashKind::Sha256 => 32,
            HashKind::Sha384 => 48,
            HashKind::Sha512 => 64,
        }
    }

    /// Decode from the on-disk byte value
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(HashKind::Sha256),
            2 => Some(HashKind::Sha384),
            3 => Some(HashKind::Sha512),
            _ => None,
        }
    }

    /// Encode to the on-disk byte value
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Supported signature schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SignatureKind {
    /// NIST P-256 (secp256r1 / prime256v1)
    Prime256v1 = 1,
    /// NIST P-384 (secp384r1)
    Secp384r1 = 2,
    /// NIST P-521 (secp521r1)
    Secp521r1 = 3,
    /// RSA-4096
    Rsa4096 = 4,
    /// Ed25519
    Ed25519 = 5,
}

impl SignatureKind {
    /// Decode from the on-disk byte value
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(SignatureKind::Prime256v1),
            2 => Some(SignatureKind::Secp384r1),
            3 => Some(SignatureKind::Secp521r1),
            4 => Some(SignatureKind::Rsa4096),
            5 => Some(SignatureKind::Ed25519),
            _ => None,
        }
    }

    /// Encode to the on-disk byte value
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Per-part flag bits (up to 8 total)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartFlags(u8);

impl PartFlags {
    /// No flags set
    pub const NONE: u8 = 0b0000_0000;

    /// Part body on disk is transport-encoded (compressed or delta), not
    /// the plain payload; `transport_size` gives the on-disk byte count
    pub const TRANSPORT: u8 = 0b0000_0001;

    /// Payload hash computation skips this part's byte range entirely
    pub const EXCLUDE_FROM_HASH: u8 = 0b0000_0010;

    /// Construct flags from a raw byte
    pub const fn new(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw flags byte
    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    /// Whether the `TRANSPORT` bit is set
    pub const fn is_transport(&self) -> bool {
        (self.0 & Self::TRANSPORT) != 0
    }

    /// Whether the `EXCLUDE_FROM_HASH` bit is set
    pub const fn is_excluded_from_hash(&self) -> bool {
        (self.0 & Self::EXCLUDE_FROM_HASH) != 0
    }

    /// Return a copy with `TRANSPORT` set or cleared
    pub const fn with_transport(self, on: bool) -> Self {
        if on {
            Self(self.0 | Self::TRANSPORT)
        } else {
            Self(self.0 & !Self::TRANSPORT)
        }
    }
}

impl Default for PartFlags {
    fn default() -> Self {
        Self(Self::NONE)
    }
}

/// Well-known meta keys understood by the core (spec §3)
pub mod meta_keys {
    /// `bpak-transport` — encode/decode algorithm ids for a part, scoped by part id
    pub const BPAK_TRANSPORT: &str = "bpak-transport";
    /// `merkle-salt` — per-part 32-byte salt used by the Merkle tree builder
    pub const MERKLE_SALT: &str = "merkle-salt";
    /// `merkle-root-hash` — per-part 32-byte Merkle tree root hash
    pub const MERKLE_ROOT_HASH: &str = "merkle-root-hash";
    /// `bpak-key-id` — human-readable echo of `header.key_id`
    pub const BPAK_KEY_ID: &str = "bpak-key-id";
    /// `bpak-keystore-id` — human-readable echo of `header.keystore_id`
    pub const BPAK_KEYSTORE_ID: &str = "bpak-keystore-id";
    /// `bpak-package` — UUID identifying the archive
    pub const BPAK_PACKAGE: &str = "bpak-package";
    /// `bpak-package-uid` — UUID identifying a specific build of the archive
    pub const BPAK_PACKAGE_UID: &str = "bpak-package-uid";
    /// `bpak-version` — opaque catalog-layer version string
    pub const BPAK_VERSION_STR: &str = "bpak-version";
    /// `bpak-dependency` — opaque catalog-layer dependency string
    pub const BPAK_DEPENDENCY: &str = "bpak-dependency";
}

/// Transport algorithms known to the core (spec §4.7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportAlgorithm {
    /// Copy bytes verbatim
    Identity,
    /// Heatshrink-style byte-stream compression, no origin reference
    Heatshrink,
    /// bsdiff-style binary delta against the same-id part in the origin archive
    Bsdiff,
    /// Regenerate a Merkle tree part from scratch
    MerkleGenerate,
    /// Emit a zero-byte body
    RemoveData,
}

impl TransportAlgorithm {
    /// The meta-key name the core hashes with [`crate::id::id_from_name`] to
    /// select this algorithm
    pub const fn name(&self) -> &'static str {
        match self {
            TransportAlgorithm::Identity => "bpak-identity",
            TransportAlgorithm::Heatshrink => "bpak-heatshrink",
            TransportAlgorithm::Bsdiff => "bpak-bsdiff",
            TransportAlgorithm::MerkleGenerate => "bpak-merkle-generate",
            TransportAlgorithm::RemoveData => "remove-data",
        }
    }

    /// Resolve an algorithm from its C1 id hash
    pub fn from_id(id: u32) -> Option<Self> {
        const CANDIDATES: [TransportAlgorithm; 5] = [
            TransportAlgorithm::Identity,
            TransportAlgorithm::Heatshrink,
            TransportAlgorithm::Bsdiff,
            TransportAlgorithm::MerkleGenerate,
            TransportAlgorithm::RemoveData,
        ];
        CANDIDATES
            .into_iter()
            .find(|a| crate::id::id_from_name(a.name()).ok() == Some(id))
    }
}
