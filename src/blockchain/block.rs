use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Measurement;
use crate::utils;

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64,
    pub measurements: Vec<Measurement>,
    pub node_id: Option<String>,
    pub previous_hash: String,
    pub nonce: u64,
    /// Cached digest of the other fields; [`Block::compute_hash`] is authoritative.
    pub hash: String,
}

/// Block fields fixed before the nonce search starts.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub index: u64,
    pub timestamp: i64,
    pub measurements: Vec<Measurement>,
    pub node_id: Option<String>,
    pub previous_hash: String,
}

impl BlockTemplate {
    /// Template for the block that follows `previous`.
    pub fn next(previous: &Block, measurements: Vec<Measurement>, node_id: Option<String>) -> Self {
        let timestamp = Utc::now().timestamp().max(previous.timestamp);
        BlockTemplate {
            index: previous.index + 1,
            timestamp,
            measurements,
            node_id,
            previous_hash: previous.hash.clone(),
        }
    }

    pub fn seal(self, nonce: u64, hash: String) -> Block {
        Block {
            index: self.index,
            timestamp: self.timestamp,
            measurements: self.measurements,
            node_id: self.node_id,
            previous_hash: self.previous_hash,
            nonce,
            hash,
        }
    }
}

impl Block {
    /// Identical on every node: no measurements, no author, timestamp 0, nonce 0.
    pub fn genesis() -> Block {
        let template = BlockTemplate {
            index: 0,
            timestamp: 0,
            measurements: Vec::new(),
            node_id: None,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
        };
        let hash = utils::hash(0, 0, &[], None, GENESIS_PREVIOUS_HASH, 0);
        template.seal(0, hash)
    }

    pub fn compute_hash(&self) -> String {
        utils::hash(
            self.index,
            self.timestamp,
            &self.measurements,
            self.node_id.as_deref(),
            &self.previous_hash,
            self.nonce,
        )
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let created = DateTime::<Utc>::from_timestamp(self.timestamp, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| self.timestamp.to_string());
        writeln!(f, "Block Hash: {}", self.hash)?;
        writeln!(f, "Block Number: {}", self.index)?;
        writeln!(f, "Node ID: {}", self.node_id.as_deref().unwrap_or("-"))?;
        writeln!(f, "Timestamp: {}", created)?;
        writeln!(f, "Previous Hash: {}", self.previous_hash)?;
        write!(f, "Nonce: {}", self.nonce)?;
        for m in &self.measurements {
            write!(
                f,
                "\n  Station: {}\n  Voltage Vector: {:?}\n  Current Vector: {:?}\n  Power Vector: {:?}\n  Metadata: {:?}",
                m.node_id, m.voltage_vector, m.current_vector, m.power_vector, m.metadata
            )?;
        }
        Ok(())
    }
}
