use crate::blockchain::{Block, Consensus, Ledger, MiningControl};
use crate::error::LedgerError;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

pub type SharedLedger<C> = Arc<RwLock<Ledger<C>>>;

/// Stale results are retried this many times before being reported.
pub const STALE_RETRIES: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct MiningSettings {
    /// Wall-clock limit for one nonce search.
    pub timeout: Option<Duration>,
    /// Nonce attempts per search.
    pub max_attempts: Option<u64>,
}

impl MiningSettings {
    fn control(&self) -> MiningControl {
        match self.max_attempts {
            Some(max) => MiningControl::with_max_attempts(max),
            None => MiningControl::unbounded(),
        }
    }
}

/// Mines the pending queue into a new block without holding the ledger lock
/// during the nonce search.
pub async fn mine_pending<C: Consensus>(
    ledger: &SharedLedger<C>,
    settings: &MiningSettings,
) -> Result<Block, LedgerError> {
    for attempt in 0..=STALE_RETRIES {
        let (job, consensus) = {
            let ledger = ledger.read();
            (ledger.mining_job(), ledger.consensus().clone())
        };
        let consumed = job.consumed;

        let control = settings.control();
        let search_control = control.clone();
        let search =
            tokio::task::spawn_blocking(move || consensus.seal(job.template, &search_control));

        let joined = match settings.timeout {
            Some(limit) => match tokio::time::timeout(limit, search).await {
                Ok(joined) => joined,
                Err(_) => {
                    control.cancel();
                    warn!(?limit, "mining timed out");
                    return Err(LedgerError::MiningCancelled);
                }
            },
            None => search.await,
        };
        let block = joined.map_err(|e| LedgerError::MiningTask(e.to_string()))??;

        let committed = {
            let mut guard = ledger.write();
            guard.commit_mined(block, consumed).cloned()
        };
        match committed {
            Ok(block) => return Ok(block),
            Err(LedgerError::StaleMiningResult) => {
                warn!(attempt, "chain changed during mining, discarding block");
            }
            Err(e) => return Err(e),
        }
    }
    Err(LedgerError::StaleMiningResult)
}

pub enum MiningCommand {
    StartMining,
    StopMining,
    Shutdown,
}

/// Background miner that seals the pending queue whenever it is non-empty.
pub struct MiningCoordinator<C: Consensus> {
    command_rx: Receiver<MiningCommand>,
    ledger: SharedLedger<C>,
    settings: MiningSettings,
    accumulation_time_ms: u64,
    is_mining: bool,
}

impl<C: Consensus> MiningCoordinator<C> {
    pub fn new(
        ledger: SharedLedger<C>,
        settings: MiningSettings,
        accumulation_time_ms: u64,
    ) -> (Self, Sender<MiningCommand>) {
        let (command_tx, command_rx) = mpsc::channel(32);
        (
            MiningCoordinator {
                command_rx,
                ledger,
                settings,
                accumulation_time_ms,
                is_mining: false,
            },
            command_tx,
        )
    }

    pub async fn run(&mut self) {
        loop {
            while let Ok(command) = self.command_rx.try_recv() {
                match command {
                    MiningCommand::StartMining => {
                        info!("start mining process");
                        self.is_mining = true;
                    }
                    MiningCommand::StopMining => {
                        info!("stopping mining process");
                        self.is_mining = false;
                    }
                    MiningCommand::Shutdown => {
                        info!("shutting down mining coordinator");
                        return;
                    }
                }
            }

            // let measurements accumulate before sealing a batch
            sleep(Duration::from_millis(self.accumulation_time_ms)).await;
            if !self.is_mining {
                continue;
            }

            let has_pending = !self.ledger.read().pending().is_empty();
            if has_pending {
                match mine_pending(&self.ledger, &self.settings).await {
                    Ok(block) => info!(index = block.index, "auto-mined block"),
                    Err(e) => warn!(error = %e, "auto-mining failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{MeasurementSubmission, ProofOfWork, MAX_DIFFICULTY};

    fn shared(difficulty: usize) -> SharedLedger<ProofOfWork> {
        Arc::new(RwLock::new(Ledger::new(
            ProofOfWork::new(difficulty),
            "node-a",
            100,
        )))
    }

    fn submission(station: &str) -> MeasurementSubmission {
        MeasurementSubmission {
            voltage_vector: Some(vec![230.5, 231.2, 230.8]),
            current_vector: Some(vec![10.2, 10.1, 10.3]),
            power_vector: Some(vec![2351.1, 2335.12, 2377.24]),
            node_id: Some(station.to_string()),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn mines_pending_through_shared_handle() {
        let ledger = shared(2);
        ledger.write().submit_measurement(submission("station_001")).unwrap();

        let block = mine_pending(&ledger, &MiningSettings::default()).await.unwrap();
        assert_eq!(block.index, 1);
        assert!(block.hash.starts_with("00"));

        let ledger = ledger.read();
        assert_eq!(ledger.chain().len(), 2);
        assert!(ledger.pending().is_empty());
    }

    #[tokio::test]
    async fn concurrent_mines_keep_chain_valid() {
        let ledger = shared(1);
        for i in 0..4 {
            ledger
                .write()
                .submit_measurement(submission(&format!("station_{i}")))
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                mine_pending(&ledger, &MiningSettings::default()).await
            }));
        }
        for handle in handles {
            // a stale result after all retries is an acceptable outcome
            let _ = handle.await.unwrap();
        }

        let ledger = ledger.read();
        assert!(ledger.is_valid());
        assert!(ledger.pending().is_empty());
        let sealed: usize = ledger.chain().iter().map(|b| b.measurements.len()).sum();
        assert_eq!(sealed, 4);
    }

    #[tokio::test]
    async fn timeout_cancels_search() {
        let ledger = shared(MAX_DIFFICULTY);
        let settings = MiningSettings {
            timeout: Some(Duration::from_millis(50)),
            max_attempts: None,
        };
        assert!(matches!(
            mine_pending(&ledger, &settings).await,
            Err(LedgerError::MiningCancelled)
        ));
        assert_eq!(ledger.read().chain().len(), 1);
    }

    #[tokio::test]
    async fn attempt_cap_is_reported() {
        let ledger = shared(MAX_DIFFICULTY);
        let settings = MiningSettings {
            timeout: None,
            max_attempts: Some(10),
        };
        assert!(matches!(
            mine_pending(&ledger, &settings).await,
            Err(LedgerError::MiningExhausted { attempts: 10 })
        ));
    }

    #[tokio::test]
    async fn coordinator_mines_when_started() {
        let ledger = shared(1);
        let (mut coordinator, commands) =
            MiningCoordinator::new(ledger.clone(), MiningSettings::default(), 10);
        let task = tokio::spawn(async move { coordinator.run().await });

        ledger.write().submit_measurement(submission("station_001")).unwrap();
        commands.send(MiningCommand::StartMining).await.unwrap();

        for _ in 0..200 {
            if ledger.read().chain().len() > 1 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        commands.send(MiningCommand::Shutdown).await.unwrap();
        task.await.unwrap();

        let ledger = ledger.read();
        assert_eq!(ledger.chain().len(), 2);
        assert!(ledger.pending().is_empty());
    }
}
