use std::collections::HashSet;
use url::Url;

use crate::error::LedgerError;

/// Known peer base URLs, normalised to `scheme://host[:port]`.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    nodes: HashSet<String>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent. Returns whether the address was newly added.
    pub fn register(&mut self, address: &str) -> Result<bool, LedgerError> {
        let normalized = normalize_address(address)?;
        Ok(self.nodes.insert(normalized))
    }

    /// Snapshot in sorted order.
    pub fn list(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.nodes.iter().cloned().collect();
        nodes.sort();
        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Accepts `host:port` or a full URL; paths and queries are dropped.
pub fn normalize_address(address: &str) -> Result<String, LedgerError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidPeerAddress(address.to_string()));
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let url = Url::parse(&candidate)
        .map_err(|e| LedgerError::InvalidPeerAddress(format!("{address}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LedgerError::InvalidPeerAddress(format!(
            "{address}: unsupported scheme {}",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| LedgerError::InvalidPeerAddress(address.to_string()))?;

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}
