use clap::Parser;
use std::time::Duration;

use crate::blockchain::{MiningSettings, MAX_DIFFICULTY};

fn default_node_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn parse_difficulty(value: &str) -> Result<usize, String> {
    let difficulty: usize = value.parse().map_err(|e| format!("{e}"))?;
    if difficulty > MAX_DIFFICULTY {
        return Err(format!("difficulty must be at most {MAX_DIFFICULTY}"));
    }
    Ok(difficulty)
}

/// Power-grid telemetry ledger node.
#[derive(Debug, Clone, Parser)]
#[command(name = "gridledger", version)]
pub struct NodeConfig {
    /// Interface to bind
    #[arg(long, env = "GRIDLEDGER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP port
    #[arg(short, long, env = "GRIDLEDGER_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Leading zero hex characters a block hash needs
    #[arg(short, long, env = "GRIDLEDGER_DIFFICULTY", default_value_t = 4, value_parser = parse_difficulty)]
    pub difficulty: usize,

    /// Identifier stamped on blocks this node mines
    #[arg(long, env = "GRIDLEDGER_NODE_ID", default_value_t = default_node_id())]
    pub node_id: String,

    /// Peer to reconcile with (repeatable)
    #[arg(long = "peer", env = "GRIDLEDGER_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Maximum pending measurements
    #[arg(long, env = "GRIDLEDGER_MEMPOOL_CAPACITY", default_value_t = 10_000)]
    pub mempool_capacity: usize,

    /// Seconds between consensus rounds, 0 disables them
    #[arg(long, env = "GRIDLEDGER_SYNC_INTERVAL_SECS", default_value_t = 10)]
    pub sync_interval_secs: u64,

    /// Per-peer fetch timeout in seconds
    #[arg(long, env = "GRIDLEDGER_PEER_TIMEOUT_SECS", default_value_t = 5)]
    pub peer_timeout_secs: u64,

    /// Wall-clock limit for one nonce search, 0 means unbounded
    #[arg(long, env = "GRIDLEDGER_MINING_TIMEOUT_SECS", default_value_t = 0)]
    pub mining_timeout_secs: u64,

    /// Nonce attempts per search, 0 means unbounded
    #[arg(long, env = "GRIDLEDGER_MAX_MINING_ATTEMPTS", default_value_t = 0)]
    pub max_mining_attempts: u64,

    /// Auto-mine pending measurements at this interval, 0 disables it
    #[arg(long, env = "GRIDLEDGER_AUTO_MINE_INTERVAL_MS", default_value_t = 0)]
    pub auto_mine_interval_ms: u64,
}

impl NodeConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs.max(1))
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_secs > 0).then(|| Duration::from_secs(self.sync_interval_secs))
    }

    pub fn mining_settings(&self) -> MiningSettings {
        MiningSettings {
            timeout: (self.mining_timeout_secs > 0)
                .then(|| Duration::from_secs(self.mining_timeout_secs)),
            max_attempts: (self.max_mining_attempts > 0).then_some(self.max_mining_attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = NodeConfig::parse_from(["gridledger"]);
        assert_eq!(config.bind_address(), "127.0.0.1:5000");
        assert_eq!(config.difficulty, 4);
        assert_eq!(config.node_id.len(), 32);
        assert!(config.peers.is_empty());
        assert_eq!(config.sync_interval(), Some(Duration::from_secs(10)));
        assert!(config.mining_settings().timeout.is_none());
        assert!(config.mining_settings().max_attempts.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let config = NodeConfig::parse_from([
            "gridledger",
            "--port",
            "5001",
            "--difficulty",
            "2",
            "--peer",
            "http://127.0.0.1:5000",
            "--peer",
            "127.0.0.1:5002",
            "--sync-interval-secs",
            "0",
            "--mining-timeout-secs",
            "30",
        ]);
        assert_eq!(config.port, 5001);
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.sync_interval(), None);
        assert_eq!(config.mining_settings().timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn rejects_out_of_range_difficulty() {
        assert!(NodeConfig::try_parse_from(["gridledger", "--difficulty", "65"]).is_err());
    }
}
