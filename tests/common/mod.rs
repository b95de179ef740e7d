//! Synthetic regtest chains shared by the integration tests.
#![allow(dead_code)]

use bitcoin::{hashes::Hash, TxMerkleNode};
use niebla_spv::{
    merkle::{merkle_root, MerklePath},
    pow, BlockHeader, ChainParams, ChainStore,
};

/// Fresh regtest chain and its genesis header.
pub fn regtest() -> (ChainStore, BlockHeader) {
    let params = ChainParams::regtest();
    let genesis = params.genesis;
    (ChainStore::new(params), genesis)
}

/// Solve `header` against its own bits by bumping the nonce.
pub fn solve(mut header: BlockHeader) -> BlockHeader {
    while !pow::check_header(&header) {
        header.nonce += 1;
    }
    header
}

/// Valid child of `prev`; `tag` keeps sibling branches apart.
pub fn mine(prev: &BlockHeader, tag: u8) -> BlockHeader {
    solve(BlockHeader {
        version: 4,
        prev_blockhash: prev.identity(),
        merkle_root: TxMerkleNode::from_byte_array([tag; 32]),
        time: prev.time + 600,
        bits: pow::REGTEST_BITS,
        nonce: 0,
    })
}

/// `n` successive children on top of `from`.
pub fn branch(from: &BlockHeader, n: usize, tag: u8) -> Vec<BlockHeader> {
    let mut out: Vec<BlockHeader> = Vec::with_capacity(n);
    for _ in 0..n {
        let next = mine(out.last().unwrap_or(from), tag);
        out.push(next);
    }
    out
}

/// Child of `prev` (at `height`) committing to `leaves`, plus the proof for `leaves[index]`.
pub fn block_with(
    prev: &BlockHeader,
    height: u32,
    leaves: &[&[u8]],
    index: usize,
) -> (BlockHeader, MerklePath) {
    let mut header = mine(prev, 0);
    header.merkle_root = merkle_root(leaves).expect("non-empty leaves");
    let header = solve(header);
    let path = MerklePath::from_leaves(leaves, index, height).expect("index in range");
    (header, path)
}
