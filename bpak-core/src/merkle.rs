//! C6: the salted Merkle hash tree.
//!
//! A single payload part can be covered by a multi-level SHA-256 tree:
//! each 4096-byte data block becomes a salted leaf hash, groups of 128
//! hashes at a level fold into one salted parent hash at the next level,
//! cascading until a single root remains. Used for authenticated
//! random-access verification of one block without re-hashing the whole
//! part.

use alloc::vec::Vec;
use sha2::{Digest, Sha256};

use crate::constants::{MERKLE_BLOCK_SIZE, MERKLE_FANOUT};
use crate::error::BpakError;
use crate::Result;

const HASH_SIZE: usize = 32;
const GROUP_BYTES: usize = MERKLE_FANOUT * HASH_SIZE;

fn salted_hash(salt: &[u8; HASH_SIZE], data: &[u8]) -> [u8; HASH_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(data);
    hasher.finalize().into()
}

/// Streaming builder for one part's Merkle tree.
///
/// Feed payload bytes in arbitrary-size chunks via [`Self::update`], then
/// call [`Self::finish`] with the total declared payload size.
pub struct MerkleTreeBuilder {
    salt: [u8; HASH_SIZE],
    leaf_partial: Vec<u8>,
    total_fed: u64,
    levels: Vec<Vec<u8>>,
}

impl MerkleTreeBuilder {
    /// Start a new tree with the given 32-byte salt (normally freshly
    /// random, see `rand`-backed salt generation at the call site).
    pub fn new(salt: [u8; HASH_SIZE]) -> Self {
        MerkleTreeBuilder {
            salt,
            leaf_partial: Vec::new(),
            total_fed: 0,
            levels: alloc::vec![Vec::new()],
        }
    }

    /// Feed the next chunk of payload bytes, of arbitrary size.
    pub fn update(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let need = MERKLE_BLOCK_SIZE - self.leaf_partial.len();
            let take = need.min(bytes.len());
            self.leaf_partial.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            self.total_fed += take as u64;
            if self.leaf_partial.len() == MERKLE_BLOCK_SIZE {
                let h = salted_hash(&self.salt, &self.leaf_partial);
                self.push_hash(0, &h);
                self.leaf_partial.clear();
            }
        }
    }

    fn push_hash(&mut self, level: usize, hash: &[u8; HASH_SIZE]) {
        if level >= self.levels.len() {
            self.levels.push(Vec::new());
        }
        self.levels[level].extend_from_slice(hash);
        if self.levels[level].len() % GROUP_BYTES == 0 {
            let len = self.levels[level].len();
            let group = self.levels[level][len - GROUP_BYTES..].to_vec();
            let parent = salted_hash(&self.salt, &group);
            self.push_hash(level + 1, &parent);
        }
    }

    /// Flush all partial blocks (zero-padded) and yield `(root_hash,
    /// tree_bytes)`, where `tree_bytes` is every level's hashes
    /// concatenated leaves-first.
    ///
    /// Fails with [`BpakError::SizeError`] if the bytes fed via
    /// [`Self::update`] do not total `payload_size`.
    pub fn finish(mut self, payload_size: u64) -> Result<([u8; HASH_SIZE], Vec<u8>)> {
        if self.total_fed != payload_size {
            return Err(BpakError::SizeError(alloc::format!(
                "merkle tree fed {} bytes, expected {payload_size}",
                self.total_fed
            )));
        }

        if !self.leaf_partial.is_empty() || self.total_fed == 0 {
            let mut padded = self.leaf_partial.clone();
            padded.resize(MERKLE_BLOCK_SIZE, 0);
            let h = salted_hash(&self.salt, &padded);
            self.push_hash(0, &h);
            self.leaf_partial.clear();
        }

        let mut level = 0;
        while self.levels[level].len() != HASH_SIZE {
            let len = self.levels[level].len();
            let leftover = len % GROUP_BYTES;
            if leftover != 0 {
                let mut group = self.levels[level][len - leftover..].to_vec();
                group.resize(GROUP_BYTES, 0);
                let parent = salted_hash(&self.salt, &group);
                self.push_hash(level + 1, &parent);
            }
            level += 1;
        }

        let root: [u8; HASH_SIZE] = self.levels[level][..HASH_SIZE].try_into().unwrap();
        let mut tree_bytes = Vec::new();
        for lvl in &self.levels {
            tree_bytes.extend_from_slice(lvl);
        }
        Ok((root, tree_bytes))
    }
}

/// Per-level entry counts for a tree with `leaf_count` leaves, leaves
/// first, ending with exactly one root entry.
fn level_counts(leaf_count: usize) -> Vec<usize> {
    let mut counts = alloc::vec![leaf_count.max(1)];
    while *counts.last().unwrap() > 1 {
        let prev = *counts.last().unwrap();
        counts.push((prev + MERKLE_FANOUT - 1) / MERKLE_FANOUT);
    }
    counts
}

/// Replay a single 4 KiB payload block through its sibling path in
/// `tree_bytes` and recompute the root.
///
/// `leaf_count` is the number of leaves the tree was built over
/// (`ceil(payload_size / 4096)`, at least 1). `block` is the plain payload
/// bytes of block `block_index` (zero-padded by the caller if it is the
/// final, partial block). Returns the recomputed root hash; callers
/// compare it against the stored `merkle-root-hash` meta value.
pub fn verify_block(
    tree_bytes: &[u8],
    leaf_count: usize,
    salt: &[u8; HASH_SIZE],
    block_index: usize,
    block: &[u8],
) -> Result<[u8; HASH_SIZE]> {
    let counts = level_counts(leaf_count);
    if block_index >= counts[0] {
        return Err(BpakError::InvalidArgument(alloc::format!(
            "block index {block_index} out of range for {} leaves",
            counts[0]
        )));
    }

    let mut offsets = alloc::vec![0usize];
    for c in &counts {
        offsets.push(offsets.last().unwrap() + c * HASH_SIZE);
    }

    let mut padded_block = [0u8; MERKLE_BLOCK_SIZE];
    let n = block.len().min(MERKLE_BLOCK_SIZE);
    padded_block[..n].copy_from_slice(&block[..n]);
    let mut cur_hash = salted_hash(salt, &padded_block);
    let mut cur_index = block_index;

    for lvl in 0..counts.len() - 1 {
        let count = counts[lvl];
        let level_start = offsets[lvl];
        let group_start = (cur_index / MERKLE_FANOUT) * MERKLE_FANOUT;
        let group_len = MERKLE_FANOUT.min(count - group_start);

        let mut group = alloc::vec![0u8; GROUP_BYTES];
        let src_start = level_start + group_start * HASH_SIZE;
        let src_len = group_len * HASH_SIZE;
        group[..src_len].copy_from_slice(&tree_bytes[src_start..src_start + src_len]);

        let slot = cur_index - group_start;
        group[slot * HASH_SIZE..(slot + 1) * HASH_SIZE].copy_from_slice(&cur_hash);

        cur_hash = salted_hash(salt, &group);
        cur_index = group_start / MERKLE_FANOUT;
    }

    Ok(cur_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_partial_block_tree() {
        let salt = [7u8; HASH_SIZE];
        let mut b = MerkleTreeBuilder::new(salt);
        let data = alloc::vec![0xAAu8; 100];
        b.update(&data);
        let (root, tree_bytes) = b.finish(100).unwrap();
        assert_eq!(tree_bytes.len(), HASH_SIZE);

        let recomputed = verify_block(&tree_bytes, 1, &salt, 0, &data).unwrap();
        assert_eq!(recomputed, root);
    }

    #[test]
    fn many_blocks_tree_verifies_any_block() {
        let salt = [3u8; HASH_SIZE];
        let mut b = MerkleTreeBuilder::new(salt);
        let block = alloc::vec![0x42u8; MERKLE_BLOCK_SIZE];
        let n_blocks = 5usize;
        for _ in 0..n_blocks {
            b.update(&block);
        }
        let payload_size = (n_blocks * MERKLE_BLOCK_SIZE) as u64;
        let (root, tree_bytes) = b.finish(payload_size).unwrap();

        for idx in 0..n_blocks {
            let recomputed = verify_block(&tree_bytes, n_blocks, &salt, idx, &block).unwrap();
            assert_eq!(recomputed, root);
        }
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let mut b = MerkleTreeBuilder::new([0u8; HASH_SIZE]);
        b.update(&[1, 2, 3]);
        assert!(b.finish(999).is_err());
    }

    #[test]
    fn empty_payload_still_yields_a_root() {
        let b = MerkleTreeBuilder::new([9u8; HASH_SIZE]);
        let (root, tree_bytes) = b.finish(0).unwrap();
        assert_eq!(tree_bytes.len(), HASH_SIZE);
        assert_eq!(tree_bytes, root);
    }
}
