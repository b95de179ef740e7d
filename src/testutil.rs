//! Regtest header mining for unit tests.
use bitcoin::{hashes::Hash, TxMerkleNode};

use crate::{header::BlockHeader, pow};

/// Child of `prev` that meets the regtest target. `tag` fills the merkle root
/// so sibling branches hash differently.
pub(crate) fn mine(prev: &BlockHeader, tag: u8) -> BlockHeader {
    let mut header = BlockHeader {
        version: 4,
        prev_blockhash: prev.identity(),
        merkle_root: TxMerkleNode::from_byte_array([tag; 32]),
        time: prev.time + 600,
        bits: pow::REGTEST_BITS,
        nonce: 0,
    };
    while !pow::check_header(&header) {
        header.nonce += 1;
    }
    header
}

/// `n` successive children starting on top of `from`.
pub(crate) fn branch(from: &BlockHeader, n: usize, tag: u8) -> Vec<BlockHeader> {
    let mut out: Vec<BlockHeader> = Vec::with_capacity(n);
    for _ in 0..n {
        let next = mine(out.last().unwrap_or(from), tag);
        out.push(next);
    }
    out
}
