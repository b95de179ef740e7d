//! Wallet glue: output inspection for payment checks.
//!
//! The engine never decodes transactions. Whoever holds the transaction
//! extracts its outputs and answers whether it pays what was expected.

/// Answers "does the transaction behind `leaf_id` pay `amount` to `recipient_commitment`?".
pub trait PaymentInspector: Send + Sync {
    /// `true` if some output of the transaction identified by `leaf_id`
    /// commits to `recipient_commitment` with at least `amount`.
    fn pays(&self, leaf_id: &[u8], recipient_commitment: &[u8], amount: u64) -> bool;
}

impl<F> PaymentInspector for F
where
    F: Fn(&[u8], &[u8], u64) -> bool + Send + Sync,
{
    fn pays(&self, leaf_id: &[u8], recipient_commitment: &[u8], amount: u64) -> bool {
        self(leaf_id, recipient_commitment, amount)
    }
}

/// One already-extracted transaction output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedOutput {
    /// Recipient commitment (e.g. a locking script or its hash).
    pub commitment: Vec<u8>,
    /// Output value in base units.
    pub amount: u64,
}

/// Inspector over outputs the caller already pulled out of one transaction.
#[derive(Clone, Debug, Default)]
pub struct ExtractedOutputs {
    leaf_id: Vec<u8>,
    outputs: Vec<ExtractedOutput>,
}

impl ExtractedOutputs {
    /// Outputs of the transaction identified by `leaf_id`.
    pub fn new(leaf_id: impl Into<Vec<u8>>, outputs: Vec<ExtractedOutput>) -> Self {
        Self {
            leaf_id: leaf_id.into(),
            outputs,
        }
    }
}

impl PaymentInspector for ExtractedOutputs {
    fn pays(&self, leaf_id: &[u8], recipient_commitment: &[u8], amount: u64) -> bool {
        self.leaf_id == leaf_id
            && self
                .outputs
                .iter()
                .any(|o| o.commitment == recipient_commitment && o.amount >= amount)
    }
}
