//! Network parameters: genesis, header checkpoints and timestamp tolerance.
use std::{str::FromStr, time::Duration};

use bitcoin::{hashes::Hash, BlockHash, TxMerkleNode};

use crate::{header::BlockHeader, pow::REGTEST_BITS};

/// Headers may run at most this far ahead of local time.
pub const DEFAULT_MAX_FUTURE_DRIFT: Duration = Duration::from_secs(2 * 60 * 60);

/// Coinbase-only merkle root shared by the mainnet and regtest genesis blocks (raw byte order).
const GENESIS_MERKLE_ROOT: [u8; 32] = [
    0x3b, 0xa3, 0xed, 0xfd, 0x7a, 0x7b, 0x12, 0xb2, 0x7a, 0xc7, 0x2c, 0x3e, 0x67, 0x76, 0x8f, 0x61,
    0x7f, 0xc8, 0x1b, 0xc3, 0x88, 0x8a, 0x51, 0x32, 0x3a, 0x9f, 0xb8, 0xaa, 0x4b, 0x1e, 0x5e, 0x4a,
];

const MAINNET_CHECKPOINTS: &[(u32, &str)] = &[
    (11_111, "0000000069e244f73d78e8fd29ba2fd2ed618bd6fa2ee92559f542fdb26e7c1d"),
    (33_333, "000000002dd5588a74784eaa7ab0507a18ad16a236e7b1ce69f00d7ddfb5d0a6"),
    (74_000, "0000000000573993a3c9e41ce34471c079dcf5f52a0e824a81e7f953b8661a20"),
    (105_000, "00000000000291ce28027faea320c8d2b054b2e0fe44a773f3eefb151d6bdc97"),
    (134_444, "00000000000005b12ffd4cd315cd34ffd4a594f430ac814c91184a0d42d2b0fe"),
    (168_000, "000000000000099e61ea72015e79632f216fe6cb33d7899acb35b75c8303b763"),
    (193_000, "000000000000059f452a5f7340de6682a977387c17010ff6e6c3bd83ca8b1317"),
    (210_000, "000000000000048b95347e83192f69cf0366076336c639f9b7228e9ba171342e"),
];

/// What a [`crate::chain::ChainStore`] needs to know about its network.
#[derive(Clone, Debug)]
pub struct ChainParams {
    /// Height-0 header. Trusted as-is, never validated.
    pub genesis: BlockHeader,
    /// `(height, hash)` pairs a header at that height must match.
    pub checkpoints: Vec<(u32, BlockHash)>,
    /// How far past local time a header timestamp may be.
    pub max_future_drift: Duration,
}

impl ChainParams {
    /// Parameters for a custom chain rooted at `genesis`.
    pub fn new(genesis: BlockHeader) -> Self {
        Self {
            genesis,
            checkpoints: vec![],
            max_future_drift: DEFAULT_MAX_FUTURE_DRIFT,
        }
    }

    /// Bitcoin mainnet with its early hard-coded checkpoints.
    pub fn mainnet() -> Self {
        let checkpoints = MAINNET_CHECKPOINTS
            .iter()
            .filter_map(|(h, s)| BlockHash::from_str(s).ok().map(|hash| (*h, hash)))
            .collect();
        Self::new(BlockHeader {
            version: 1,
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root: TxMerkleNode::from_byte_array(GENESIS_MERKLE_ROOT),
            time: 1_231_006_505,
            bits: 0x1d00ffff,
            nonce: 2_083_236_893,
        })
        .with_checkpoints(checkpoints)
    }

    /// Regtest: trivial difficulty, no checkpoints.
    pub fn regtest() -> Self {
        Self::new(BlockHeader {
            version: 1,
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root: TxMerkleNode::from_byte_array(GENESIS_MERKLE_ROOT),
            time: 1_296_688_602,
            bits: REGTEST_BITS,
            nonce: 2,
        })
    }

    /// Replace the checkpoint list.
    pub fn with_checkpoints(mut self, v: Vec<(u32, BlockHash)>) -> Self {
        self.checkpoints = v;
        self
    }

    /// Override the future-timestamp tolerance.
    pub fn with_max_future_drift(mut self, drift: Duration) -> Self {
        self.max_future_drift = drift;
        self
    }

    /// Pinned hash at `height`, if any.
    pub fn checkpoint_at(&self, height: u32) -> Option<BlockHash> {
        self.checkpoints
            .iter()
            .find(|(h, _)| *h == height)
            .map(|(_, hash)| *hash)
    }
}
