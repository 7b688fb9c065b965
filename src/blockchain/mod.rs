pub mod block;
pub mod chain;
pub mod consensus;
pub mod mempool;
pub mod mining;
pub mod peers;
pub mod sync;

pub use block::{Block, BlockTemplate, GENESIS_PREVIOUS_HASH};
pub use chain::{Ledger, MiningJob};
pub use consensus::{Consensus, MiningControl, ProofOfWork, MAX_DIFFICULTY};
pub use mempool::{Measurement, MeasurementSubmission, Mempool};
pub use mining::{mine_pending, MiningCommand, MiningCoordinator, MiningSettings, SharedLedger};
pub use peers::PeerRegistry;
pub use sync::{resolve_conflicts, synchronize, ChainFetcher, Resolution, SharedPeers};
