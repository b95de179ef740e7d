//! Minimal root-by-height oracle for higher-level payment flows.
//!
//! Flows that only carry a merkle path (no block hash) ask a tracker whether
//! the root they computed belongs to the block at the path's height.
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::TxMerkleNode;

use crate::{chain::ChainStore, merkle::MerklePath};

/// Answers whether a merkle root is the one committed at a given height.
#[async_trait]
pub trait ChainTracker: Send + Sync {
    /// `true` if the preferred-branch header at `height` commits to `root`.
    async fn is_valid_root_for_height(&self, root: &TxMerkleNode, height: u32) -> anyhow::Result<bool>;

    /// Current best height.
    async fn current_height(&self) -> anyhow::Result<u32>;
}

#[async_trait]
impl ChainTracker for ChainStore {
    async fn is_valid_root_for_height(&self, root: &TxMerkleNode, height: u32) -> anyhow::Result<bool> {
        Ok(self
            .header_at(height)
            .is_some_and(|h| h.merkle_root() == root))
    }

    async fn current_height(&self) -> anyhow::Result<u32> {
        Ok(self.tip_height())
    }
}

#[async_trait]
impl<T: ChainTracker + ?Sized> ChainTracker for Arc<T> {
    async fn is_valid_root_for_height(&self, root: &TxMerkleNode, height: u32) -> anyhow::Result<bool> {
        (**self).is_valid_root_for_height(root, height).await
    }

    async fn current_height(&self) -> anyhow::Result<u32> {
        (**self).current_height().await
    }
}

/// Replay `path` from `leaf_id` and ask `tracker` about the resulting root
/// at `path.block_height`.
pub async fn verify_with_tracker<T>(tracker: &T, leaf_id: &[u8], path: &MerklePath) -> anyhow::Result<bool>
where
    T: ChainTracker + ?Sized,
{
    let root = path.compute_root(leaf_id);
    tracker.is_valid_root_for_height(&root, path.block_height).await
}
