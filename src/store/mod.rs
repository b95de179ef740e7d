//! Persistence interfaces and implementations used by the sync engine
//! (accepted headers and the last known tip).
use async_trait::async_trait;
use bitcoin::BlockHash;

use crate::header::HEADER_SIZE;

/// Minimal persistence interface: raw headers in acceptance order plus a tip marker.
#[async_trait]
pub trait Store: Send + Sync {
    /// Append an accepted header. Saving the same header twice is a no-op.
    async fn save_header(&self, raw: [u8; HEADER_SIZE]) -> anyhow::Result<()>;

    /// Every saved header in the order it was saved (parents before children).
    async fn load_headers(&self) -> anyhow::Result<Vec<[u8; HEADER_SIZE]>>;

    /// Number of saved headers.
    async fn header_count(&self) -> anyhow::Result<u64>;

    /// Last saved tip `(height, hash)`.
    async fn load_tip(&self) -> anyhow::Result<Option<(u32, BlockHash)>>;

    /// Record the current tip.
    async fn save_tip(&self, height: u32, hash: BlockHash) -> anyhow::Result<()>;
}

// concrete stores live here
pub mod memory_store;
pub use memory_store::MemoryStore;

#[cfg(feature = "store-sqlite")]
pub mod sqlite_store;
#[cfg(feature = "store-sqlite")]
pub use sqlite_store::SqliteStore;
