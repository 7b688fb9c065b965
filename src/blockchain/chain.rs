use tracing::{debug, info};

use super::block::{Block, BlockTemplate};
use super::consensus::{Consensus, MiningControl};
use super::mempool::{Measurement, MeasurementSubmission, Mempool};
use crate::error::LedgerError;

/// Work order for one mining round, taken while holding the ledger lock.
#[derive(Debug, Clone)]
pub struct MiningJob {
    pub template: BlockTemplate,
    /// Number of pending measurements captured in `template`.
    pub consumed: usize,
}

/// The node's chain, its pending measurement queue and the proof rule.
pub struct Ledger<C: Consensus> {
    chain: Vec<Block>,
    mempool: Mempool,
    consensus: C,
    node_id: String,
}

impl<C: Consensus> Ledger<C> {
    pub fn new(consensus: C, node_id: impl Into<String>, mempool_capacity: usize) -> Self {
        let genesis = Block::genesis();
        info!(hash = %genesis.hash, "created genesis block");

        Ledger {
            chain: vec![genesis],
            mempool: Mempool::new(mempool_capacity),
            consensus,
            node_id: node_id.into(),
        }
    }

    pub fn submit_measurement(
        &mut self,
        submission: MeasurementSubmission,
    ) -> Result<&Measurement, LedgerError> {
        let measurement = submission.validate()?;
        let accepted = self.mempool.add_measurement(measurement)?;
        debug!(station = %accepted.node_id, "measurement queued");
        Ok(accepted)
    }

    /// Mines all pending measurements in place, holding `&mut self` for the
    /// whole search. Concurrent callers should use
    /// [`mine_pending`](super::mining::mine_pending) instead.
    pub fn mine(&mut self) -> Result<Block, LedgerError> {
        self.mine_with(&MiningControl::unbounded())
    }

    pub fn mine_with(&mut self, control: &MiningControl) -> Result<Block, LedgerError> {
        let job = self.mining_job();
        let block = self.consensus.seal(job.template, control)?;
        self.commit_mined(block, job.consumed).cloned()
    }

    pub fn mining_job(&self) -> MiningJob {
        let measurements = self.mempool.pending().to_vec();
        let consumed = measurements.len();
        MiningJob {
            template: BlockTemplate::next(self.tip(), measurements, Some(self.node_id.clone())),
            consumed,
        }
    }

    /// Appends a block sealed from a [`MiningJob`], unless the tip moved since
    /// the job was taken.
    pub fn commit_mined(&mut self, block: Block, consumed: usize) -> Result<&Block, LedgerError> {
        if !self.consensus.validate_block(self.tip(), &block) {
            return Err(LedgerError::StaleMiningResult);
        }

        self.mempool.remove_mined(consumed);
        self.chain.push(block);

        let block = self.tip();
        info!(
            index = block.index,
            nonce = block.nonce,
            hash = %block.hash,
            measurements = block.measurements.len(),
            "mined block"
        );
        debug!("{block}");
        Ok(block)
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending(&self) -> &[Measurement] {
        self.mempool.pending()
    }

    pub fn tip(&self) -> &Block {
        self.chain
            .last()
            .expect("ledger always holds at least the genesis block")
    }

    pub fn consensus(&self) -> &C {
        &self.consensus
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_valid(&self) -> bool {
        self.consensus.validate_chain(&self.chain)
    }

    /// Installs `candidate` wholesale. Callers validate first; the check here
    /// only keeps a broken chain from ever becoming local state.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<(), LedgerError> {
        if candidate.is_empty() {
            return Err(LedgerError::ChainIntegrityViolation(
                "candidate chain is empty".to_string(),
            ));
        }
        if !self.consensus.validate_chain(&candidate) {
            return Err(LedgerError::ChainIntegrityViolation(
                "candidate chain failed validation".to_string(),
            ));
        }

        info!(
            old_length = self.chain.len(),
            new_length = candidate.len(),
            "replacing local chain"
        );
        self.chain = candidate;
        Ok(())
    }
}
