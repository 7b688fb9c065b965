use thiserror::Error;

/// Every recoverable failure the ledger node can report.
///
/// Chain invalidity is deliberately absent from the validator's signature:
/// an invalid peer chain is an expected input and is reported as `false`.
/// `ChainIntegrityViolation` is only produced by diagnostics such as
/// [`Ledger::replace_chain`](crate::blockchain::Ledger::replace_chain).
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid measurement: {0}")]
    DataValidation(String),

    #[error("mempool is full ({capacity} pending measurements)")]
    MempoolFull { capacity: usize },

    #[error("chain integrity violation: {0}")]
    ChainIntegrityViolation(String),

    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    #[error("peer {peer} returned a malformed chain: {reason}")]
    MalformedPeerResponse { peer: String, reason: String },

    #[error("invalid peer address: {0}")]
    InvalidPeerAddress(String),

    #[error("chain tip moved while mining, result discarded")]
    StaleMiningResult,

    #[error("mining was cancelled")]
    MiningCancelled,

    #[error("no valid nonce found within {attempts} attempts")]
    MiningExhausted { attempts: u64 },

    #[error("mining task failed: {0}")]
    MiningTask(String),
}

impl LedgerError {
    /// Errors caused by caller input rather than node state.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LedgerError::DataValidation(_) | LedgerError::InvalidPeerAddress(_)
        )
    }
}
