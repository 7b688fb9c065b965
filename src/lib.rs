//! Append-only, proof-of-work linked ledger of power-grid telemetry.
//!
//! Measurement stations submit voltage/current/power phasor samples; a node
//! seals the pending queue into blocks by proof of work and reconciles with
//! its peers using the longest-valid-chain rule.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod frontend;
pub mod utils;

pub use error::LedgerError;
