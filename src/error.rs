//! Typed failures at the byte and chain boundaries.
//!
//! Verification outcomes are not errors: see [`crate::verifier::VerificationResult`].
use bitcoin::BlockHash;

/// Failure to decode an 80-byte block header.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    /// Input is not exactly 80 bytes long.
    #[error("malformed header: expected 80 bytes, got {0}")]
    Malformed(usize),
    /// Hex input could not be decoded.
    #[error("invalid header hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Reasons a header is refused by [`crate::chain::ChainStore::ingest`].
///
/// Every variant leaves the store untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// The previous-block hash does not name a stored header. Retry once it arrives.
    #[error("header {hash} references unknown predecessor {prev}")]
    MissingPredecessor {
        /// Identity of the refused header.
        hash: BlockHash,
        /// The predecessor it points to.
        prev: BlockHash,
    },
    /// Header hash is above the target encoded by its own bits.
    #[error("header {hash} does not meet its declared target (bits {bits:#010x})")]
    InsufficientWork {
        /// Identity of the refused header.
        hash: BlockHash,
        /// Declared compact target.
        bits: u32,
    },
    /// Timestamp lies too far in the future.
    #[error("header {hash} timestamp {time} exceeds limit {limit}")]
    TimestampOutOfRange {
        /// Identity of the refused header.
        hash: BlockHash,
        /// Header timestamp.
        time: u32,
        /// Latest acceptable timestamp at ingestion time.
        limit: u64,
    },
    /// Header sits at a checkpointed height but hashes differently.
    #[error("checkpoint mismatch @{height}: expected {expected}, got {got}")]
    CheckpointMismatch {
        /// Checkpointed height.
        height: u32,
        /// Hash pinned by the checkpoint.
        expected: BlockHash,
        /// Hash of the refused header.
        got: BlockHash,
    },
    /// Chain bookkeeping failed while classifying the header.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Failures of read-side chain queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The hash is not stored.
    #[error("unknown header {0}")]
    UnknownHeader(BlockHash),
    /// No common ancestor within stored history; a deeper backfill is required.
    #[error("no common ancestor between {0} and {1} in stored history")]
    DisjointChains(BlockHash, BlockHash),
}

/// Failure to decode a merkle path from its wire form.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// Input ended before `field` could be read.
    #[error("truncated merkle path while reading {field}")]
    Truncated {
        /// Field being read.
        field: &'static str,
    },
    /// A compact-size integer was malformed or non-canonical.
    #[error("invalid varint for {field}: {reason}")]
    InvalidVarInt {
        /// Field being read.
        field: &'static str,
        /// Decoder message.
        reason: String,
    },
    /// Block height does not fit 32 bits.
    #[error("block height {0} out of range")]
    HeightOutOfRange(u64),
    /// Side byte other than 0 (left) or 1 (right).
    #[error("invalid sibling side byte {0:#04x}")]
    InvalidSide(u8),
    /// Bytes left over after the last sibling.
    #[error("{0} trailing bytes after merkle path")]
    TrailingBytes(usize),
    /// Sibling digest is not valid hex.
    #[error("invalid sibling digest {0:?}")]
    InvalidDigest(String),
    /// Hex wrapper could not be decoded.
    #[error("invalid merkle path hex: {0}")]
    Hex(#[from] hex::FromHexError),
    /// JSON form could not be parsed or produced.
    #[error("merkle path json: {0}")]
    Json(#[from] serde_json::Error),
}
