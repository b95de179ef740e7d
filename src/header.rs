//! Fixed 80-byte block header codec.
//!
//! Layout (all integers little-endian):
//!
//! | offset | size | field            |
//! |--------|------|------------------|
//! | 0      | 4    | version          |
//! | 4      | 32   | previous block   |
//! | 36     | 32   | merkle root      |
//! | 68     | 4    | timestamp        |
//! | 72     | 4    | bits             |
//! | 76     | 4    | nonce            |
//!
//! Digests are kept in raw (internal) byte order. `BlockHash` and
//! `TxMerkleNode` print byte-reversed, which is what explorers and peers show.
use bitcoin::{
    block,
    hashes::{sha256d, Hash},
    pow::CompactTarget,
    BlockHash, TxMerkleNode,
};

use crate::error::HeaderError;

/// Size of a serialized header.
pub const HEADER_SIZE: usize = 80;

/// A parsed block header. Immutable value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockHeader {
    /// Block version.
    pub version: i32,
    /// Identity of the predecessor.
    pub prev_blockhash: BlockHash,
    /// Root of the block's transaction merkle tree.
    pub merkle_root: TxMerkleNode,
    /// Unix timestamp claimed by the miner.
    pub time: u32,
    /// Compact proof-of-work target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
}

impl BlockHeader {
    /// Decode exactly [`HEADER_SIZE`] bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() != HEADER_SIZE {
            return Err(HeaderError::Malformed(bytes.len()));
        }
        Ok(Self {
            version: le_u32(bytes, 0) as i32,
            prev_blockhash: BlockHash::from_byte_array(digest(bytes, 4)),
            merkle_root: TxMerkleNode::from_byte_array(digest(bytes, 36)),
            time: le_u32(bytes, 68),
            bits: le_u32(bytes, 72),
            nonce: le_u32(bytes, 76),
        })
    }

    /// Decode from a hex string of the 80 raw bytes.
    pub fn from_hex(s: &str) -> Result<Self, HeaderError> {
        Self::parse(&hex::decode(s.trim())?)
    }

    /// Canonical 80-byte encoding; exact inverse of [`BlockHeader::parse`].
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.prev_blockhash.as_byte_array());
        out[36..68].copy_from_slice(self.merkle_root.as_byte_array());
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// Lower-case hex of the serialized bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    /// Double-SHA256 of the serialized header: the lookup key everywhere.
    pub fn identity(&self) -> BlockHash {
        BlockHash::from_raw_hash(sha256d::Hash::hash(&self.serialize()))
    }
}

impl From<block::Header> for BlockHeader {
    fn from(h: block::Header) -> Self {
        Self {
            version: h.version.to_consensus(),
            prev_blockhash: h.prev_blockhash,
            merkle_root: h.merkle_root,
            time: h.time,
            bits: h.bits.to_consensus(),
            nonce: h.nonce,
        }
    }
}

impl From<BlockHeader> for block::Header {
    fn from(h: BlockHeader) -> Self {
        Self {
            version: block::Version::from_consensus(h.version),
            prev_blockhash: h.prev_blockhash,
            merkle_root: h.merkle_root,
            time: h.time,
            bits: CompactTarget::from_consensus(h.bits),
            nonce: h.nonce,
        }
    }
}

// Callers guarantee `bytes.len() == HEADER_SIZE`.
fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn digest(bytes: &[u8], at: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes[at..at + 32]);
    out
}
