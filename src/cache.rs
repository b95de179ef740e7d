//! Time-bounded result cache in front of [`SpvVerifier`].
//!
//! Confirmation counts move with every tip change, so the whole cache is
//! dropped whenever the tip moves. `Pending` outcomes are never cached.
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use bitcoin::{BlockHash, TxMerkleNode};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{
    chain::TipSnapshot,
    merkle::{leaf_hash, MerklePath},
    verifier::{SpvVerifier, VerificationResult},
};

type CacheKey = (TxMerkleNode, Vec<u8>, BlockHash);

struct CacheState {
    tip_rx: watch::Receiver<TipSnapshot>,
    entries: HashMap<CacheKey, (VerificationResult, Instant)>,
}

/// Caching decorator over [`SpvVerifier::verify`].
pub struct CachedVerifier {
    inner: SpvVerifier,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl CachedVerifier {
    /// Cache results of `inner` for at most `ttl`.
    pub fn new(inner: SpvVerifier, ttl: Duration) -> Self {
        let tip_rx = inner.chain().subscribe();
        Self {
            inner,
            ttl,
            state: Mutex::new(CacheState {
                tip_rx,
                entries: HashMap::new(),
            }),
        }
    }

    /// The wrapped verifier.
    pub fn inner(&self) -> &SpvVerifier {
        &self.inner
    }

    /// Same contract as [`SpvVerifier::verify`].
    pub fn verify(
        &self,
        leaf_id: &[u8],
        path: &MerklePath,
        claimed_block: &BlockHash,
    ) -> VerificationResult {
        let key = (leaf_hash(leaf_id), path.to_bytes(), *claimed_block);

        let seen = {
            let mut state = self.state.lock();
            if state.tip_rx.has_changed().unwrap_or(true) {
                state.entries.clear();
            }
            let seen = *state.tip_rx.borrow_and_update();
            if let Some((result, at)) = state.entries.get(&key) {
                if at.elapsed() < self.ttl {
                    return *result;
                }
            }
            seen
        };

        let result = self.inner.verify(leaf_id, path, claimed_block);
        if matches!(result, VerificationResult::Pending { .. }) {
            return result;
        }

        let mut state = self.state.lock();
        // A tip change while verifying makes this result stale already.
        if *state.tip_rx.borrow() == seen {
            let ttl = self.ttl;
            state.entries.retain(|_, (_, at)| at.elapsed() < ttl);
            state.entries.insert(key, (result, Instant::now()));
        }
        result
    }

    /// Number of stored entries. Expired ones linger until the next insert.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        chain::ChainStore,
        params::ChainParams,
        testutil::{branch, mine},
        verifier::PendingReason,
    };
    use bitcoin::{hashes::Hash, TxMerkleNode};

    fn setup(ttl: Duration) -> (CachedVerifier, Arc<ChainStore>, crate::header::BlockHeader) {
        let params = ChainParams::regtest();
        let genesis = params.genesis;
        let chain = Arc::new(ChainStore::new(params));
        (CachedVerifier::new(SpvVerifier::new(chain.clone()), ttl), chain, genesis)
    }

    // Header whose merkle root is the single leaf `id`.
    fn block_for(prev: &crate::header::BlockHeader, id: &[u8]) -> crate::header::BlockHeader {
        let mut h = mine(prev, 0);
        h.merkle_root = leaf_hash(id);
        while !crate::pow::check_header(&h) {
            h.nonce += 1;
        }
        h
    }

    #[test]
    fn caches_until_tip_moves() {
        let (cache, chain, genesis) = setup(Duration::from_secs(60));
        let block = block_for(&genesis, b"tx");
        chain.ingest(block).unwrap();
        let path = MerklePath::new(1, 0, vec![]);

        let first = cache.verify(b"tx", &path, &block.identity());
        assert_eq!(first, VerificationResult::Verified { height: 1, confirmations: 1 });
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.verify(b"tx", &path, &block.identity()), first);

        for h in branch(&block, 2, 1) {
            chain.ingest(h).unwrap();
        }
        assert_eq!(
            cache.verify(b"tx", &path, &block.identity()),
            VerificationResult::Verified { height: 1, confirmations: 3 }
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn pending_is_not_cached() {
        let (cache, _chain, _) = setup(Duration::from_secs(60));
        let unknown = BlockHash::all_zeros();
        let path = MerklePath::new(0, 0, vec![]);
        assert_eq!(
            cache.verify(b"tx", &path, &unknown),
            VerificationResult::Pending { reason: PendingReason::HeaderUnknown }
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entries_are_recomputed() {
        let (cache, chain, genesis) = setup(Duration::ZERO);
        let block = block_for(&genesis, b"tx");
        chain.ingest(block).unwrap();
        let wrong = MerklePath::new(1, 0, vec![crate::merkle::MerkleStep::right(TxMerkleNode::all_zeros())]);
        let r = cache.verify(b"tx", &wrong, &block.identity());
        assert!(!r.is_verified());
        // Zero TTL: the entry is stored but never served.
        assert_eq!(cache.verify(b"tx", &wrong, &block.identity()), r);
        assert_eq!(cache.len(), 1);
        // Inserting a different query evicts the expired one.
        assert!(!cache.verify(b"other", &wrong, &block.identity()).is_verified());
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn only_expired_entries_are_evicted() {
        let (cache, chain, genesis) = setup(Duration::from_millis(50));
        let block = block_for(&genesis, b"tx");
        chain.ingest(block).unwrap();
        let wrong = MerklePath::new(1, 0, vec![crate::merkle::MerkleStep::left(TxMerkleNode::all_zeros())]);

        cache.verify(b"a", &wrong, &block.identity());
        cache.verify(b"b", &wrong, &block.identity());
        assert_eq!(cache.len(), 2);

        std::thread::sleep(Duration::from_millis(80));
        cache.verify(b"c", &wrong, &block.identity());
        assert_eq!(cache.len(), 1);
    }
}
