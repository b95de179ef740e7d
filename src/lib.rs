#![forbid(unsafe_code)]
#![deny(missing_docs)]
//! niebla-spv: a simplified payment verification engine.
//!
//! Keeps a proof-of-work validated chain of block headers and answers one
//! question: is this transaction included in the chain, and how deeply buried?
//!
//! ## What you implement
//! - [`HeaderSource`]: hand out raw 80-byte headers by height.
//! - [`Store`]: keep accepted headers and a tip marker (or use
//!   [`MemoryStore`] / [`SqliteStore`]).
//! - [`PaymentInspector`]: say whether a transaction pays what you expect
//!   (only needed for [`SpvVerifier::verify_payment`]).
//!
//! ## What the engine does
//! - Decodes headers and checks **proof of work**, timestamps and optional checkpoints.
//! - Tracks competing branches and **reorganizes** to the one with most cumulative work.
//! - Replays **merkle paths** to the header's root and reports **confirmations**.
//!
//! ## Minimal usage
//! ```rust,ignore
//! use std::sync::Arc;
//! use niebla_spv::prelude::*;
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//!
//! // --- Your header source ---
//! struct MyPeer;
//! #[async_trait]
//! impl HeaderSource for MyPeer {
//!     async fn tip_height(&self) -> anyhow::Result<u32> { Ok(0) }
//!     async fn headers_from(&self, _start: u32, _count: u32) -> anyhow::Result<Vec<Vec<u8>>> {
//!         Ok(vec![])
//!     }
//! }
//!
//! // --- Wire it up ---
//! async fn run(leaf: &[u8], path_hex: &str, block: BlockHash) -> anyhow::Result<()> {
//!     let chain = Arc::new(ChainStore::new(ChainParams::mainnet()));
//!     let sync = HeaderSync::new(chain.clone(), SqliteStore::new("headers.db")?, MyPeer);
//!     sync.restore().await?;
//!     sync.run_to_tip(&CancellationToken::new()).await?;
//!
//!     let verifier = SpvVerifier::new(chain);
//!     let path = MerklePath::from_hex(path_hex)?;
//!     match verifier.verify(leaf, &path, &block) {
//!         VerificationResult::Verified { confirmations, .. } => println!("{confirmations} confs"),
//!         other => println!("not yet: {other:?}"),
//!     }
//!     Ok(())
//! }
//! ```

/// Error types returned by decoding and chain operations.
pub mod error;

/// 80-byte block header codec.
pub mod header;

/// Compact targets, proof-of-work checks and per-block work.
pub mod pow;

/// Merkle inclusion paths and their wire forms.
pub mod merkle;

/// Network parameters: genesis, checkpoints, timestamp tolerance.
pub mod params;

/// Header chain with fork choice and reorganization.
pub mod chain;

/// Confirmation depth arithmetic.
pub mod confirmations;

/// Inclusion and payment verification.
pub mod verifier;

/// TTL cache in front of the verifier.
pub mod cache;

/// Payment inspection callbacks.
pub mod hooks;

/// Root-by-height oracle.
#[cfg(feature = "runtime")]
pub mod chain_tracker;

/// Header sync driver.
#[cfg(feature = "runtime")]
pub mod engine;

/// Header source abstraction (height → raw headers).
#[cfg(feature = "runtime")]
pub mod headers;

/// Persistence layer (traits, in-memory and SQLite implementations).
#[cfg(feature = "runtime")]
pub mod store;

#[cfg(test)]
mod testutil;

// Public re-exports
pub use bitcoin::{BlockHash, TxMerkleNode};
pub use cache::CachedVerifier;
pub use chain::{ChainHeader, ChainStore, HeaderStatus, IngestOutcome, TipSnapshot};
pub use confirmations::confirmations;
pub use error::{ChainError, HeaderError, IngestError, PathError};
pub use header::BlockHeader;
pub use hooks::{ExtractedOutput, ExtractedOutputs, PaymentInspector};
pub use merkle::{MerklePath, MerkleStep, Side};
pub use params::ChainParams;
pub use verifier::{
    PaymentExpectation, PendingReason, RejectCause, SpvVerifier, VerificationResult,
};

#[cfg(feature = "runtime")]
pub use chain_tracker::ChainTracker;
#[cfg(feature = "runtime")]
pub use engine::{HeaderSync, SyncReport};
#[cfg(feature = "runtime")]
pub use headers::HeaderSource;
#[cfg(feature = "runtime")]
pub use store::{MemoryStore, Store};
#[cfg(feature = "store-sqlite")]
pub use store::SqliteStore;

/// Convenience prelude for end users.
pub mod prelude {
    pub use crate::{
        BlockHash, BlockHeader, CachedVerifier, ChainParams, ChainStore, IngestOutcome,
        MerklePath, PaymentExpectation, PaymentInspector, SpvVerifier, VerificationResult,
    };

    #[cfg(feature = "runtime")]
    pub use crate::{ChainTracker, HeaderSource, HeaderSync, MemoryStore, Store};

    #[cfg(feature = "store-sqlite")]
    pub use crate::SqliteStore;
}
