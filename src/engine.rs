//! Header sync driver:
//! 1) replay persisted headers into the [`ChainStore`],
//! 2) pull new headers from a [`HeaderSource`] in batches,
//! 3) ingest each one and persist what was accepted.
//!
//! The store's tip marker only advances once every preferred-branch header
//! up to it has been written. Anything above the marker is re-written on the
//! next run, so a failed write never leaves a hole in the stored chain.
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    chain::{ChainStore, IngestOutcome},
    error::IngestError,
    header::BlockHeader,
    headers::HeaderSource,
    store::Store,
};

/// How many headers to request per round trip.
const HEADERS_BATCH: u32 = 2_000;

/// Counters from one [`HeaderSync::run_to_tip`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Headers newly stored (extensions, reorgs and side branches).
    pub accepted: usize,
    /// Headers the chain already had.
    pub duplicates: usize,
    /// How many of the accepted headers moved the tip to another branch.
    pub reorgs: usize,
    /// Preferred tip height when the run ended.
    pub tip_height: u32,
    /// `true` if the run stopped because the token was cancelled.
    pub cancelled: bool,
}

/// Keeps a shared [`ChainStore`] in step with a header source. `S` = store, `H` = header source.
pub struct HeaderSync<S, H> {
    chain: Arc<ChainStore>,
    store: S,
    source: H,
    batch_size: u32,
}

impl<S, H> HeaderSync<S, H>
where
    S: Store + 'static,
    H: HeaderSource + 'static,
{
    /// Create a driver feeding `chain` from `source` and persisting into `store`.
    pub fn new(chain: Arc<ChainStore>, store: S, source: H) -> Self {
        Self {
            chain,
            store,
            source,
            batch_size: HEADERS_BATCH,
        }
    }

    /// Override the request window (minimum 1).
    pub fn with_batch_size(mut self, n: u32) -> Self {
        self.batch_size = n.max(1);
        self
    }

    /// The chain being fed.
    pub fn chain(&self) -> &Arc<ChainStore> {
        &self.chain
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replay every persisted header into the chain. Returns how many were
    /// new to the chain.
    ///
    /// Headers stored ahead of their parent are retried once the parent is in.
    /// Headers whose parent never shows up are skipped with a warning.
    ///
    /// # Errors
    /// Fails if the store cannot be read or a stored header no longer passes
    /// validation (e.g. the store belongs to another network).
    pub async fn restore(&self) -> anyhow::Result<usize> {
        let raws = self
            .store
            .load_headers()
            .await
            .context("load persisted headers")?;
        let mut pending = raws
            .iter()
            .map(|raw| BlockHeader::parse(raw))
            .collect::<Result<Vec<_>, _>>()
            .context("decode persisted header")?;

        let mut accepted = 0;
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            for header in pending {
                match self.chain.ingest(header) {
                    Ok(IngestOutcome::Duplicate) => {}
                    Ok(_) => accepted += 1,
                    Err(IngestError::MissingPredecessor { .. }) => deferred.push(header),
                    Err(e) => {
                        return Err(e)
                            .with_context(|| format!("replay header {}", header.identity()))
                    }
                }
            }
            if deferred.len() == before {
                warn!(skipped = before, "persisted headers without a stored ancestor");
                break;
            }
            pending = deferred;
        }

        let tip = self.chain.tip();
        if let Some((height, hash)) = self.store.load_tip().await? {
            if hash != tip.hash {
                warn!(
                    stored_height = height,
                    stored = %hash,
                    height = tip.height,
                    tip = %tip.hash,
                    "persisted tip differs from replayed tip"
                );
            }
        }
        info!(accepted, height = tip.height, "restored header chain");
        Ok(accepted)
    }

    /// Write the preferred branch above the store's tip marker, then move the
    /// marker to the chain tip. Returns how many headers were written.
    ///
    /// Writes are idempotent, so headers the store already has cost nothing
    /// but the call.
    pub async fn persist_branch(&self) -> anyhow::Result<usize> {
        let tip = self.chain.tip();
        let start = match self.store.load_tip().await? {
            Some((_, hash)) if hash == tip.hash => return Ok(0),
            Some((_, hash)) if self.chain.contains(&hash) => {
                self.chain.fork_point(&hash, &tip.hash)?.height + 1
            }
            _ => 1,
        };

        let mut written = 0;
        for height in start..=tip.height {
            let Some(header) = self.chain.header_at(height) else {
                break;
            };
            self.store
                .save_header(header.header.serialize())
                .await
                .with_context(|| format!("persist header @{height}"))?;
            written += 1;
        }
        self.store.save_tip(tip.height, tip.hash).await?;
        if written > 0 {
            debug!(from = start, height = tip.height, written, "persisted preferred branch");
        }
        Ok(written)
    }

    /// Pull headers from the source until the chain reaches the source's tip.
    ///
    /// Cancellation is checked between batches; a batch in flight is always
    /// finished and persisted. When the source serves a header whose parent
    /// is unknown (it reorganized below the local tip), the request window
    /// steps back, doubling the distance each time, until the fork is found.
    ///
    /// # Errors
    /// Returns an error if the source fails, a header does not decode or is
    /// rejected by the chain, the source shares no history with the chain,
    /// or the store cannot persist progress.
    pub async fn run_to_tip(&self, cancel: &CancellationToken) -> anyhow::Result<SyncReport> {
        let mut report = SyncReport::default();
        self.persist_branch()
            .await
            .context("persist headers left over from an earlier run")?;

        let remote_tip = self
            .source
            .tip_height()
            .await
            .context("source tip_height")?;

        let mut next = self.chain.tip_height().saturating_add(1);
        let mut step_back = 1u32;
        let mut searched_to_genesis = false;
        while next <= remote_tip {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let count = self.batch_size.min(remote_tip - next + 1);
            let batch = self
                .source
                .headers_from(next, count)
                .await
                .with_context(|| format!("headers_from(start={next}, count={count})"))?;
            if batch.is_empty() {
                debug!(next, "source returned an empty batch");
                break;
            }

            let mut rewind = None;
            let mut reorged = false;
            for (i, raw) in batch.iter().enumerate() {
                let height = next + i as u32;
                let header = BlockHeader::parse(raw)
                    .with_context(|| format!("decode header @{height}"))?;
                let outcome = match self.chain.ingest(header) {
                    Err(IngestError::MissingPredecessor { prev, .. })
                        if height > 1 && !searched_to_genesis =>
                    {
                        let back_to = height.saturating_sub(step_back).max(1);
                        searched_to_genesis = back_to == 1;
                        warn!(height, %prev, back_to, "source diverges below local tip");
                        step_back = step_back.saturating_mul(2);
                        rewind = Some(back_to);
                        break;
                    }
                    other => other.with_context(|| format!("ingest header @{height}"))?,
                };
                match outcome {
                    IngestOutcome::Duplicate => {
                        report.duplicates += 1;
                        continue;
                    }
                    IngestOutcome::Reorganized { .. } => {
                        report.reorgs += 1;
                        reorged = true;
                    }
                    IngestOutcome::Extended { .. } | IngestOutcome::SideBranch { .. } => {}
                }
                report.accepted += 1;
                self.store.save_header(header.serialize()).await?;
            }

            // A reorg may promote headers a failed earlier run never wrote.
            if reorged {
                self.persist_branch().await?;
            } else {
                let tip = self.chain.tip();
                self.store.save_tip(tip.height, tip.hash).await?;
            }

            if let Some(back_to) = rewind {
                next = back_to;
                continue;
            }
            next = next.saturating_add(batch.len() as u32);
            info!(
                height = self.chain.tip_height(),
                accepted = report.accepted,
                "synced header batch"
            );
        }

        report.tip_height = self.chain.tip_height();
        Ok(report)
    }
}
