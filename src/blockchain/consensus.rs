use super::block::{Block, BlockTemplate};
use crate::error::LedgerError;
use crate::utils;
use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Largest meaningful difficulty: every character of a SHA-256 hex digest.
pub const MAX_DIFFICULTY: usize = 64;

/// Bounds a nonce search. Cloned handles share the cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct MiningControl {
    cancelled: Arc<AtomicBool>,
    max_attempts: Option<u64>,
}

impl MiningControl {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(max_attempts: u64) -> Self {
        MiningControl {
            cancelled: Arc::new(AtomicBool::new(false)),
            max_attempts: Some(max_attempts),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

pub trait Consensus: Sized + Clone + Send + Sync + 'static {
    /// Searches for a proof over `template` and returns the finished block.
    fn seal(&self, template: BlockTemplate, control: &MiningControl) -> Result<Block, LedgerError>;

    fn validate_block(&self, previous_block: &Block, block: &Block) -> bool;

    /// Pure check of linkage and proof for a whole chain. Never fails, only
    /// answers `false`.
    fn validate_chain(&self, chain: &[Block]) -> bool {
        if chain.len() <= 1 {
            return true;
        }
        if !chain[0].is_genesis() {
            return false;
        }
        chain
            .windows(2)
            .all(|pair| self.validate_block(&pair[0], &pair[1]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: usize,
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> Self {
        ProofOfWork {
            difficulty: difficulty.min(MAX_DIFFICULTY),
        }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// At least `difficulty` leading `'0'` characters.
    pub fn meets_target(&self, hash: &str) -> bool {
        hash.len() >= self.difficulty && hash.bytes().take(self.difficulty).all(|b| b == b'0')
    }
}

impl fmt::Display for ProofOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Difficulty (leading zeros in hash) = {}",
            self.difficulty
        )
    }
}

impl Consensus for ProofOfWork {
    fn seal(&self, template: BlockTemplate, control: &MiningControl) -> Result<Block, LedgerError> {
        let header = utils::header_hasher(
            template.index,
            template.timestamp,
            &template.measurements,
            template.node_id.as_deref(),
            &template.previous_hash,
        );

        let mut nonce = 0u64;
        loop {
            if control.is_cancelled() {
                return Err(LedgerError::MiningCancelled);
            }
            if let Some(max) = control.max_attempts {
                if nonce >= max {
                    return Err(LedgerError::MiningExhausted { attempts: max });
                }
            }

            let hash = utils::finalize_with_nonce(&header, nonce);
            if self.meets_target(&hash) {
                return Ok(template.seal(nonce, hash));
            }

            nonce = nonce
                .checked_add(1)
                .ok_or(LedgerError::MiningExhausted { attempts: u64::MAX })?;
        }
    }

    fn validate_block(&self, previous_block: &Block, block: &Block) -> bool {
        if block.index != previous_block.index + 1 {
            return false;
        }

        if block.previous_hash != previous_block.compute_hash() {
            return false;
        }

        if block.hash != block.compute_hash() {
            return false;
        }

        self.meets_target(&block.hash)
    }
}
