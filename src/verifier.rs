//! Inclusion verification against the header chain.
//!
//! Outcomes are values, not errors: a proof that cannot be judged yet is
//! [`VerificationResult::Pending`], a proof that is wrong is
//! [`VerificationResult::Rejected`].
use std::sync::Arc;

use bitcoin::BlockHash;
use tracing::debug;

use crate::{
    chain::ChainStore, confirmations::confirmations, hooks::PaymentInspector, merkle::MerklePath,
};

/// Why a proof cannot be judged yet. Retry later.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingReason {
    /// The claimed block hash has not been ingested.
    HeaderUnknown,
    /// Included, but not yet buried deep enough.
    InsufficientConfirmations {
        /// Confirmations at the current tip.
        have: u32,
        /// Caller's threshold.
        need: u32,
    },
}

/// Why a proof is wrong. Retrying with the same inputs will not help.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectCause {
    /// The path does not lead to the header's merkle root.
    MerkleMismatch,
    /// The transaction does not pay the expected recipient and amount.
    PaymentMismatch,
}

/// Outcome of a verification call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationResult {
    /// Included in the block at `height`.
    Verified {
        /// Height of the containing block.
        height: u32,
        /// Depth below the current tip; 0 if the block is on a side branch.
        confirmations: u32,
    },
    /// Cannot be judged yet.
    Pending {
        /// What is missing.
        reason: PendingReason,
    },
    /// Definitely not a valid proof.
    Rejected {
        /// What was wrong.
        cause: RejectCause,
    },
}

impl VerificationResult {
    /// `true` for [`VerificationResult::Verified`].
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

/// What a payment must look like to be accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentExpectation {
    /// Recipient commitment an output must carry.
    pub recipient_commitment: Vec<u8>,
    /// Minimum value of that output.
    pub amount: u64,
    /// Required depth below the tip.
    pub min_confirmations: u32,
}

/// Answers inclusion questions against one shared [`ChainStore`].
#[derive(Clone)]
pub struct SpvVerifier {
    chain: Arc<ChainStore>,
}

impl SpvVerifier {
    /// Verifier reading from `chain`.
    pub fn new(chain: Arc<ChainStore>) -> Self {
        Self { chain }
    }

    /// The store this verifier reads.
    pub fn chain(&self) -> &Arc<ChainStore> {
        &self.chain
    }

    /// Is `leaf_id`, proven by `path`, included in block `claimed_block`?
    pub fn verify(
        &self,
        leaf_id: &[u8],
        path: &MerklePath,
        claimed_block: &BlockHash,
    ) -> VerificationResult {
        let Some(anchor) = self.chain.anchor(claimed_block) else {
            debug!(block = %claimed_block, "proof references unknown header");
            return VerificationResult::Pending {
                reason: PendingReason::HeaderUnknown,
            };
        };

        let root = path.compute_root(leaf_id);
        if root != *anchor.header.merkle_root() {
            debug!(block = %claimed_block, %root, "merkle root mismatch");
            return VerificationResult::Rejected {
                cause: RejectCause::MerkleMismatch,
            };
        }

        let height = anchor.header.height;
        let confirmations = if anchor.on_main_chain {
            confirmations(height, anchor.tip_height)
        } else {
            0
        };
        VerificationResult::Verified {
            height,
            confirmations,
        }
    }

    /// [`SpvVerifier::verify`] plus a delegated output check and a depth threshold.
    ///
    /// Order: inclusion first, then `inspector`, then confirmations. Anything
    /// other than `Verified` from the inclusion step is returned unchanged.
    pub fn verify_payment<I>(
        &self,
        leaf_id: &[u8],
        path: &MerklePath,
        claimed_block: &BlockHash,
        expected: &PaymentExpectation,
        inspector: &I,
    ) -> VerificationResult
    where
        I: PaymentInspector + ?Sized,
    {
        let result = self.verify(leaf_id, path, claimed_block);
        let VerificationResult::Verified { confirmations, .. } = result else {
            return result;
        };
        if !inspector.pays(leaf_id, &expected.recipient_commitment, expected.amount) {
            return VerificationResult::Rejected {
                cause: RejectCause::PaymentMismatch,
            };
        }
        if confirmations < expected.min_confirmations {
            return VerificationResult::Pending {
                reason: PendingReason::InsufficientConfirmations {
                    have: confirmations,
                    need: expected.min_confirmations,
                },
            };
        }
        result
    }
}
