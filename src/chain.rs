//! Reorg-aware store of validated headers.
//!
//! Headers only ever point back at their parent. The preferred branch is kept
//! as a separate height index (`main[h]` is the hash at height `h`) which is
//! rewritten from the fork point whenever a branch with more cumulative work
//! shows up. Side-branch headers stay addressable by hash.
//!
//! Ingestion is serialized by a writer mutex; all validation happens under a
//! read lock and the write lock is only taken to commit, so readers are never
//! stuck behind proof-of-work checks.
use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use bitcoin::{BlockHash, TxMerkleNode};
use num_bigint::BigUint;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    error::{ChainError, IngestError},
    header::BlockHeader,
    params::ChainParams,
    pow,
};

/// Dense locator entries before the step starts doubling.
const LOCATOR_DENSE: usize = 10;

/// A validated header with its position in the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainHeader {
    /// The header itself.
    pub header: BlockHeader,
    /// Cached identity of `header`.
    pub hash: BlockHash,
    /// Predecessor height + 1; 0 for genesis.
    pub height: u32,
    /// Sum of per-block work from genesis up to and including this header.
    pub chain_work: BigUint,
    /// Unix time the header was accepted.
    pub received_at: u64,
}

impl ChainHeader {
    /// Hash of the predecessor.
    pub fn prev(&self) -> &BlockHash {
        &self.header.prev_blockhash
    }

    /// Transaction merkle root committed by this header.
    pub fn merkle_root(&self) -> &TxMerkleNode {
        &self.header.merkle_root
    }
}

/// What [`ChainStore::ingest`] did with an accepted header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Already stored; nothing changed.
    Duplicate,
    /// Header is the new tip and a child of the previous one.
    Extended {
        /// Height of the new tip.
        height: u32,
    },
    /// Header is the new tip on a branch that left the previous tip's ancestry.
    Reorganized {
        /// Height of the last common ancestor of the old and new tip.
        fork_height: u32,
        /// Height of the new tip.
        height: u32,
    },
    /// Stored, but the current tip keeps at least as much work.
    SideBranch {
        /// Height of the stored header.
        height: u32,
    },
}

/// Where a hash stands relative to the preferred branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderStatus {
    /// Never accepted (or pruned).
    Unknown,
    /// Head of the preferred branch.
    Tip,
    /// On the preferred branch below the tip.
    OnChain,
    /// Validated but on a branch with less work.
    Orphaned,
}

/// Tip summary broadcast to [`ChainStore::subscribe`] receivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TipSnapshot {
    /// Tip hash.
    pub hash: BlockHash,
    /// Tip height.
    pub height: u32,
}

/// A stored header together with the tip it was read against.
#[derive(Clone, Debug)]
pub struct Anchor {
    /// The header.
    pub header: ChainHeader,
    /// Whether it is an ancestor of (or is) the tip.
    pub on_main_chain: bool,
    /// Tip height at read time.
    pub tip_height: u32,
}

struct ChainState {
    headers: HashMap<BlockHash, ChainHeader>,
    main: Vec<BlockHash>,
    tip: ChainHeader,
}

enum TipChange {
    Keep,
    Extend,
    Reorg {
        fork_height: u32,
        // Ascending hashes from fork_height + 1 up to the new header's parent.
        branch: Vec<BlockHash>,
    },
}

impl ChainState {
    fn on_main(&self, h: &ChainHeader) -> bool {
        self.main.get(h.height as usize) == Some(&h.hash)
    }

    fn parent(&self, h: &ChainHeader) -> Option<&ChainHeader> {
        if h.height == 0 {
            return None;
        }
        self.headers.get(h.prev())
    }

    fn fork_point(&self, a: &BlockHash, b: &BlockHash) -> Result<&ChainHeader, ChainError> {
        let disjoint = || ChainError::DisjointChains(*a, *b);
        let mut x = self.headers.get(a).ok_or(ChainError::UnknownHeader(*a))?;
        let mut y = self.headers.get(b).ok_or(ChainError::UnknownHeader(*b))?;
        while x.height > y.height {
            x = self.parent(x).ok_or_else(disjoint)?;
        }
        while y.height > x.height {
            y = self.parent(y).ok_or_else(disjoint)?;
        }
        while x.hash != y.hash {
            x = self.parent(x).ok_or_else(disjoint)?;
            y = self.parent(y).ok_or_else(disjoint)?;
        }
        Ok(x)
    }

    // Height at which a side header's branch leaves the preferred branch.
    fn branch_base(&self, h: &ChainHeader) -> Option<u32> {
        let mut cur = h;
        while !self.on_main(cur) {
            cur = self.parent(cur)?;
        }
        Some(cur.height)
    }
}

/// The canonical header store. Share it with `Arc`; never clone it.
pub struct ChainStore {
    params: ChainParams,
    state: RwLock<ChainState>,
    writer: Mutex<()>,
    tip_tx: watch::Sender<TipSnapshot>,
}

impl ChainStore {
    /// Fresh store holding only the configured genesis header.
    pub fn new(params: ChainParams) -> Self {
        let genesis = params.genesis;
        let hash = genesis.identity();
        let root = ChainHeader {
            header: genesis,
            hash,
            height: 0,
            chain_work: pow::work(genesis.bits),
            received_at: unix_now(),
        };
        let (tip_tx, _) = watch::channel(TipSnapshot { hash, height: 0 });
        Self {
            params,
            state: RwLock::new(ChainState {
                headers: HashMap::from([(hash, root.clone())]),
                main: vec![hash],
                tip: root,
            }),
            writer: Mutex::new(()),
            tip_tx,
        }
    }

    /// Parameters this store validates against.
    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Validate and store `header`, judging timestamps against the system clock.
    ///
    /// # Errors
    /// See [`IngestError`]. A refused header leaves the store untouched.
    pub fn ingest(&self, header: BlockHeader) -> Result<IngestOutcome, IngestError> {
        self.ingest_at(header, unix_now())
    }

    /// Like [`ChainStore::ingest`] with an explicit "now" in unix seconds.
    pub fn ingest_at(&self, header: BlockHeader, now: u64) -> Result<IngestOutcome, IngestError> {
        let _writer = self.writer.lock();
        let hash = header.identity();

        let (height, chain_work, change) = {
            let state = self.state.read();
            if state.headers.contains_key(&hash) {
                debug!(%hash, "duplicate header");
                return Ok(IngestOutcome::Duplicate);
            }
            let parent = state.headers.get(&header.prev_blockhash).ok_or_else(|| {
                debug!(%hash, prev = %header.prev_blockhash, "predecessor not stored");
                IngestError::MissingPredecessor {
                    hash,
                    prev: header.prev_blockhash,
                }
            })?;
            let height = parent.height + 1;
            self.check(&header, hash, height, now)
                .inspect_err(|e| warn!(%hash, height, error = %e, "rejected header"))?;

            let chain_work = &parent.chain_work + pow::work(header.bits);
            let change = if chain_work <= state.tip.chain_work {
                TipChange::Keep
            } else if header.prev_blockhash == state.tip.hash {
                TipChange::Extend
            } else {
                let fork = state.fork_point(&header.prev_blockhash, &state.tip.hash)?;
                let mut branch = Vec::with_capacity((parent.height - fork.height) as usize);
                let mut cur = parent;
                while cur.height > fork.height {
                    branch.push(cur.hash);
                    cur = state
                        .parent(cur)
                        .ok_or(ChainError::DisjointChains(hash, state.tip.hash))?;
                }
                branch.reverse();
                TipChange::Reorg {
                    fork_height: fork.height,
                    branch,
                }
            };
            (height, chain_work, change)
        };

        let entry = ChainHeader {
            header,
            hash,
            height,
            chain_work,
            received_at: now,
        };

        let mut state = self.state.write();
        state.headers.insert(hash, entry.clone());
        let outcome = match change {
            TipChange::Keep => IngestOutcome::SideBranch { height },
            TipChange::Extend => {
                state.main.push(hash);
                state.tip = entry;
                IngestOutcome::Extended { height }
            }
            TipChange::Reorg {
                fork_height,
                branch,
            } => {
                state.main.truncate(fork_height as usize + 1);
                state.main.extend(branch);
                state.main.push(hash);
                state.tip = entry;
                IngestOutcome::Reorganized {
                    fork_height,
                    height,
                }
            }
        };
        drop(state);

        match outcome {
            IngestOutcome::Extended { .. } => {
                debug!(%hash, height, "tip extended");
                self.tip_tx.send_replace(TipSnapshot { hash, height });
            }
            IngestOutcome::Reorganized { fork_height, .. } => {
                info!(%hash, height, fork_height, "chain reorganized");
                self.tip_tx.send_replace(TipSnapshot { hash, height });
            }
            _ => debug!(%hash, height, "side branch header stored"),
        }
        Ok(outcome)
    }

    fn check(
        &self,
        header: &BlockHeader,
        hash: BlockHash,
        height: u32,
        now: u64,
    ) -> Result<(), IngestError> {
        if !pow::meets_target(&hash, &pow::target(header.bits)) {
            return Err(IngestError::InsufficientWork {
                hash,
                bits: header.bits,
            });
        }
        let limit = now.saturating_add(self.params.max_future_drift.as_secs());
        if u64::from(header.time) > limit {
            return Err(IngestError::TimestampOutOfRange {
                hash,
                time: header.time,
                limit,
            });
        }
        if let Some(expected) = self.params.checkpoint_at(height) {
            if expected != hash {
                return Err(IngestError::CheckpointMismatch {
                    height,
                    expected,
                    got: hash,
                });
            }
        }
        Ok(())
    }

    /// Header at `height` on the preferred branch.
    pub fn header_at(&self, height: u32) -> Option<ChainHeader> {
        let state = self.state.read();
        let hash = state.main.get(height as usize)?;
        state.headers.get(hash).cloned()
    }

    /// Any validated header, side branches included.
    pub fn header_by_hash(&self, hash: &BlockHash) -> Option<ChainHeader> {
        self.state.read().headers.get(hash).cloned()
    }

    /// Whether `hash` is stored.
    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.state.read().headers.contains_key(hash)
    }

    /// Header with the most cumulative work (earliest seen on ties).
    pub fn tip(&self) -> ChainHeader {
        self.state.read().tip.clone()
    }

    /// Height of [`ChainStore::tip`].
    pub fn tip_height(&self) -> u32 {
        self.state.read().tip.height
    }

    /// Number of stored headers across all branches.
    pub fn len(&self) -> usize {
        self.state.read().headers.len()
    }

    /// Always `false`: genesis is never removed.
    pub fn is_empty(&self) -> bool {
        self.state.read().headers.is_empty()
    }

    /// Position of `hash` relative to the preferred branch.
    pub fn status(&self, hash: &BlockHash) -> HeaderStatus {
        let state = self.state.read();
        match state.headers.get(hash) {
            None => HeaderStatus::Unknown,
            Some(h) if h.hash == state.tip.hash => HeaderStatus::Tip,
            Some(h) if state.on_main(h) => HeaderStatus::OnChain,
            Some(_) => HeaderStatus::Orphaned,
        }
    }

    /// Header, branch membership and tip height read under one lock.
    pub fn anchor(&self, hash: &BlockHash) -> Option<Anchor> {
        let state = self.state.read();
        let header = state.headers.get(hash)?;
        Some(Anchor {
            on_main_chain: state.on_main(header),
            tip_height: state.tip.height,
            header: header.clone(),
        })
    }

    /// Last common ancestor of two stored headers.
    ///
    /// # Errors
    /// [`ChainError::UnknownHeader`] if either hash is absent,
    /// [`ChainError::DisjointChains`] if stored history has no common ancestor.
    pub fn fork_point(&self, a: &BlockHash, b: &BlockHash) -> Result<ChainHeader, ChainError> {
        self.state.read().fork_point(a, b).cloned()
    }

    /// Preferred-branch hashes from the tip down: ten dense, then doubling gaps, genesis last.
    pub fn locator(&self) -> Vec<BlockHash> {
        let state = self.state.read();
        let mut out = Vec::new();
        let mut height = state.tip.height;
        let mut step = 1u32;
        loop {
            out.push(state.main[height as usize]);
            if height == 0 {
                break;
            }
            if out.len() >= LOCATOR_DENSE {
                step = step.saturating_mul(2);
            }
            height = height.saturating_sub(step);
        }
        out
    }

    /// Drop side branches that left the preferred branch more than `depth`
    /// blocks below the tip. Whole branches go, so no stored header loses its
    /// parent. Returns the number of headers removed.
    pub fn prune_side_branches(&self, depth: u32) -> usize {
        let _writer = self.writer.lock();
        let mut state = self.state.write();
        let tip_height = state.tip.height;
        let doomed: Vec<BlockHash> = state
            .headers
            .values()
            .filter(|h| !state.on_main(h))
            .filter(|h| {
                state
                    .branch_base(h)
                    .map_or(true, |base| base.saturating_add(depth) < tip_height)
            })
            .map(|h| h.hash)
            .collect();
        for hash in &doomed {
            state.headers.remove(hash);
        }
        if !doomed.is_empty() {
            info!(removed = doomed.len(), depth, tip_height, "pruned side branches");
        }
        doomed.len()
    }

    /// Receiver that observes every tip change.
    pub fn subscribe(&self) -> watch::Receiver<TipSnapshot> {
        self.tip_tx.subscribe()
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{branch, mine};

    fn regtest() -> (ChainStore, BlockHeader) {
        let params = ChainParams::regtest();
        let genesis = params.genesis;
        (ChainStore::new(params), genesis)
    }

    #[test]
    fn genesis_is_tip_of_a_fresh_store() {
        let (store, genesis) = regtest();
        let tip = store.tip();
        assert_eq!(tip.hash, genesis.identity());
        assert_eq!(tip.height, 0);
        assert_eq!(tip.chain_work, pow::work(genesis.bits));
        assert_eq!(store.status(&tip.hash), HeaderStatus::Tip);
        assert_eq!(store.ingest(genesis), Ok(IngestOutcome::Duplicate));
    }

    #[test]
    fn chain_work_accumulates() {
        let (store, genesis) = regtest();
        for h in branch(&genesis, 3, 1) {
            store.ingest(h).unwrap();
        }
        assert_eq!(store.tip().chain_work, BigUint::from(8u32));
        assert_eq!(store.header_at(2).unwrap().chain_work, BigUint::from(6u32));
    }

    #[test]
    fn locator_is_dense_then_sparse() {
        let (store, genesis) = regtest();
        for h in branch(&genesis, 30, 1) {
            store.ingest(h).unwrap();
        }
        let heights: Vec<u32> = store
            .locator()
            .iter()
            .map(|hash| store.header_by_hash(hash).unwrap().height)
            .collect();
        assert_eq!(heights, vec![30, 29, 28, 27, 26, 25, 24, 23, 22, 21, 19, 15, 7, 0]);
    }

    #[test]
    fn fork_point_of_unknown_hash_fails() {
        let (store, genesis) = regtest();
        let stranger = mine(&genesis, 9);
        assert_eq!(
            store.fork_point(&genesis.identity(), &stranger.identity()),
            Err(ChainError::UnknownHeader(stranger.identity()))
        );
    }

    #[test]
    fn fork_point_across_a_missing_link_is_disjoint() {
        let (store, genesis) = regtest();
        let a = branch(&genesis, 3, 1);
        let b = branch(&genesis, 2, 2);
        for h in a.iter().chain(&b) {
            store.ingest(*h).unwrap();
        }
        // Public operations never break a parent link; cut one by hand.
        store.state.write().headers.remove(&a[0].identity());
        assert_eq!(
            store.fork_point(&a[2].identity(), &b[1].identity()),
            Err(ChainError::DisjointChains(a[2].identity(), b[1].identity()))
        );
    }

    #[test]
    fn status_follows_reorgs() {
        let (store, genesis) = regtest();
        let a = branch(&genesis, 2, 1);
        let b = branch(&genesis, 3, 2);
        for h in &a {
            store.ingest(*h).unwrap();
        }
        assert_eq!(store.status(&a[0].identity()), HeaderStatus::OnChain);
        for h in &b {
            store.ingest(*h).unwrap();
        }
        assert_eq!(store.status(&a[0].identity()), HeaderStatus::Orphaned);
        assert_eq!(store.status(&a[1].identity()), HeaderStatus::Orphaned);
        assert_eq!(store.status(&b[2].identity()), HeaderStatus::Tip);
        assert_eq!(store.status(&mine(&genesis, 7).identity()), HeaderStatus::Unknown);
    }

    #[test]
    fn prune_keeps_recent_forks_and_main_chain() {
        let (store, genesis) = regtest();
        let main = branch(&genesis, 10, 1);
        for h in &main {
            store.ingest(*h).unwrap();
        }
        // Old fork off height 1, recent fork off height 8.
        let old = branch(&main[0], 2, 2);
        let recent = branch(&main[7], 1, 3);
        for h in old.iter().chain(&recent) {
            assert!(matches!(store.ingest(*h), Ok(IngestOutcome::SideBranch { .. })));
        }
        assert_eq!(store.len(), 11 + 3);

        assert_eq!(store.prune_side_branches(5), 2);
        assert_eq!(store.len(), 11 + 1);
        assert!(!store.contains(&old[1].identity()));
        assert!(store.contains(&recent[0].identity()));
        assert_eq!(store.tip().hash, main[9].identity());
        assert_eq!(store.prune_side_branches(0), 1);
        assert_eq!(store.len(), 11);
    }

    #[test]
    fn subscribers_see_tip_changes_only() {
        let (store, genesis) = regtest();
        let mut rx = store.subscribe();
        let a = branch(&genesis, 2, 1);
        store.ingest(a[0]).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().height, 1);

        // Equal-work sibling does not move the tip.
        store.ingest(mine(&genesis, 2)).unwrap();
        assert!(!rx.has_changed().unwrap());

        store.ingest(a[1]).unwrap();
        assert_eq!(*rx.borrow_and_update(), TipSnapshot { hash: a[1].identity(), height: 2 });
    }
}
