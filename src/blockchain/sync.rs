use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::mining::SharedLedger;
use super::{Block, Consensus, PeerRegistry};
use crate::error::LedgerError;

pub type SharedPeers = Arc<RwLock<PeerRegistry>>;

/// Source of peer chains. The only way consensus reaches the network.
pub trait ChainFetcher: Send + Sync {
    fn fetch_chain(&self, peer: &str) -> impl Future<Output = Result<Vec<Block>, LedgerError>> + Send;
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub chain: Vec<Block>,
    pub replaced: bool,
}

/// Longest-valid-chain rule: a peer chain wins only if it validates and is
/// strictly longer than the best seen so far, starting from `local_chain`.
/// Unreachable or malformed peers are skipped.
///
/// Length alone decides; a peer that mines faster wins regardless of what
/// its blocks contain.
pub async fn resolve_conflicts<C, F>(
    consensus: &C,
    local_chain: Vec<Block>,
    peers: &[String],
    fetcher: &F,
    peer_timeout: Duration,
) -> Resolution
where
    C: Consensus,
    F: ChainFetcher,
{
    let mut best = local_chain;
    let mut replaced = false;

    for peer in peers {
        let candidate = match timeout(peer_timeout, fetcher.fetch_chain(peer)).await {
            Ok(Ok(chain)) => chain,
            Ok(Err(e)) => {
                warn!(%peer, error = %e, "skipping peer");
                continue;
            }
            Err(_) => {
                let e = LedgerError::PeerUnreachable {
                    peer: peer.clone(),
                    reason: format!("no response within {peer_timeout:?}"),
                };
                warn!(%peer, error = %e, "skipping peer");
                continue;
            }
        };

        if candidate.len() <= best.len() {
            debug!(%peer, length = candidate.len(), "peer chain not longer");
            continue;
        }
        if !consensus.validate_chain(&candidate) {
            warn!(%peer, length = candidate.len(), "peer chain failed validation");
            continue;
        }

        debug!(%peer, length = candidate.len(), "new best chain");
        best = candidate;
        replaced = true;
    }

    Resolution {
        chain: best,
        replaced,
    }
}

/// Runs [`resolve_conflicts`] against the shared ledger. Network calls happen
/// without holding any lock; the winner is installed only if it is still
/// strictly longer than the local chain at that point.
pub async fn synchronize<C, F>(
    ledger: &SharedLedger<C>,
    peers: &SharedPeers,
    fetcher: &F,
    peer_timeout: Duration,
) -> Result<Resolution, LedgerError>
where
    C: Consensus,
    F: ChainFetcher,
{
    let peers = peers.read().list();
    let (local_chain, consensus) = {
        let ledger = ledger.read();
        (ledger.chain().to_vec(), ledger.consensus().clone())
    };
    if peers.is_empty() {
        return Ok(Resolution {
            chain: local_chain,
            replaced: false,
        });
    }

    let resolution = resolve_conflicts(&consensus, local_chain, &peers, fetcher, peer_timeout).await;
    if !resolution.replaced {
        return Ok(resolution);
    }

    let mut guard = ledger.write();
    if resolution.chain.len() <= guard.chain().len() {
        info!("local chain grew during resolution, keeping it");
        return Ok(Resolution {
            chain: guard.chain().to_vec(),
            replaced: false,
        });
    }
    guard.replace_chain(resolution.chain)?;
    Ok(Resolution {
        chain: guard.chain().to_vec(),
        replaced: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{Ledger, ProofOfWork};
    use std::collections::HashMap;

    /// Serves canned chains; unknown peers are unreachable.
    struct StaticFetcher {
        chains: HashMap<String, Vec<Block>>,
    }

    impl ChainFetcher for StaticFetcher {
        async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, LedgerError> {
            self.chains
                .get(peer)
                .cloned()
                .ok_or_else(|| LedgerError::PeerUnreachable {
                    peer: peer.to_string(),
                    reason: "connection refused".to_string(),
                })
        }
    }

    struct HangingFetcher;

    impl ChainFetcher for HangingFetcher {
        async fn fetch_chain(&self, _peer: &str) -> Result<Vec<Block>, LedgerError> {
            std::future::pending().await
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn pow() -> ProofOfWork {
        ProofOfWork::new(1)
    }

    fn chain_of(len: usize, author: &str) -> Vec<Block> {
        let mut ledger = Ledger::new(pow(), author, 10);
        while ledger.chain().len() < len {
            ledger.mine().unwrap();
        }
        ledger.chain().to_vec()
    }

    fn peers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn scenario_d_longest_valid_chain_wins() {
        let local = chain_of(2, "local");
        let fetcher = StaticFetcher {
            chains: HashMap::from([
                ("http://a".to_string(), chain_of(3, "a")),
                ("http://b".to_string(), chain_of(5, "b")),
            ]),
        };
        let resolution = resolve_conflicts(
            &pow(),
            local,
            &peers(&["http://a", "http://b"]),
            &fetcher,
            TIMEOUT,
        )
        .await;
        assert!(resolution.replaced);
        assert_eq!(resolution.chain.len(), 5);
        assert_eq!(resolution.chain[1].node_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn scenario_e_unreachable_and_invalid_peers_are_skipped() {
        let local = chain_of(2, "local");
        let mut broken = chain_of(4, "b");
        broken[2].previous_hash = broken[0].hash.clone();
        let fetcher = StaticFetcher {
            chains: HashMap::from([("http://b".to_string(), broken)]),
        };
        let resolution = resolve_conflicts(
            &pow(),
            local.clone(),
            &peers(&["http://down", "http://b"]),
            &fetcher,
            TIMEOUT,
        )
        .await;
        assert!(!resolution.replaced);
        assert_eq!(resolution.chain, local);
    }

    #[tokio::test]
    async fn scenario_f_equal_length_never_replaces() {
        let local = chain_of(3, "local");
        let fetcher = StaticFetcher {
            chains: HashMap::from([("http://a".to_string(), chain_of(3, "a"))]),
        };
        let resolution =
            resolve_conflicts(&pow(), local.clone(), &peers(&["http://a"]), &fetcher, TIMEOUT)
                .await;
        assert!(!resolution.replaced);
        assert_eq!(resolution.chain, local);
    }

    #[tokio::test]
    async fn hanging_peer_times_out() {
        let local = chain_of(1, "local");
        let resolution = resolve_conflicts(
            &pow(),
            local.clone(),
            &peers(&["http://slow"]),
            &HangingFetcher,
            Duration::from_millis(20),
        )
        .await;
        assert!(!resolution.replaced);
        assert_eq!(resolution.chain, local);
    }

    #[tokio::test]
    async fn synchronize_installs_longer_chain() {
        let ledger: SharedLedger<ProofOfWork> = Arc::new(RwLock::new(Ledger::new(pow(), "local", 10)));
        let registry: SharedPeers = Arc::new(RwLock::new(PeerRegistry::new()));
        registry.write().register("http://a").unwrap();

        let remote = chain_of(4, "a");
        let fetcher = StaticFetcher {
            chains: HashMap::from([("http://a".to_string(), remote.clone())]),
        };

        let resolution = synchronize(&ledger, &registry, &fetcher, TIMEOUT).await.unwrap();
        assert!(resolution.replaced);
        assert_eq!(ledger.read().chain(), remote.as_slice());

        let again = synchronize(&ledger, &registry, &fetcher, TIMEOUT).await.unwrap();
        assert!(!again.replaced);
    }

    #[tokio::test]
    async fn synchronize_without_peers_is_a_no_op() {
        let ledger: SharedLedger<ProofOfWork> = Arc::new(RwLock::new(Ledger::new(pow(), "local", 10)));
        let registry: SharedPeers = Arc::new(RwLock::new(PeerRegistry::new()));
        let fetcher = StaticFetcher {
            chains: HashMap::new(),
        };
        let resolution = synchronize(&ledger, &registry, &fetcher, TIMEOUT).await.unwrap();
        assert!(!resolution.replaced);
        assert_eq!(resolution.chain.len(), 1);
    }
}
