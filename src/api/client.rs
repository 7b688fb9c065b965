use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::blockchain::{Block, ChainFetcher};
use crate::error::LedgerError;

/// Body of `GET /chain`, served by every node and read back from peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub length: usize,
}

/// Fetches peer chains over HTTP.
#[derive(Debug, Clone)]
pub struct HttpChainFetcher {
    client: Client,
}

impl HttpChainFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpChainFetcher { client })
    }
}

impl ChainFetcher for HttpChainFetcher {
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, LedgerError> {
        let unreachable = |e: reqwest::Error| LedgerError::PeerUnreachable {
            peer: peer.to_string(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .get(format!("{}/chain", peer.trim_end_matches('/')))
            .send()
            .await
            .map_err(unreachable)?
            .error_for_status()
            .map_err(unreachable)?;

        let body = response
            .json::<ChainResponse>()
            .await
            .map_err(|e| LedgerError::MalformedPeerResponse {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;

        if body.length != body.chain.len() {
            return Err(LedgerError::MalformedPeerResponse {
                peer: peer.to_string(),
                reason: format!(
                    "reported length {} but sent {} blocks",
                    body.length,
                    body.chain.len()
                ),
            });
        }
        Ok(body.chain)
    }
}
