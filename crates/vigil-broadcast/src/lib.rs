//! Vigil broadcast client.
//!
//! The single I/O boundary of the system: submits signed transactions and
//! reports confirmation state via the Electrum protocol. Every operation
//! walks the configured endpoint list in order — try endpoint N, on any
//! transport or protocol error log it and move to N+1 — with no built-in
//! backoff; retry pacing and timeouts are the caller's responsibility.
//!
//! An unconfirmed transaction has no on-chain side effect, so a rejected
//! broadcast is always safe to resubmit later or through other endpoints.
//!
//! # Security
//!
//! - Always use SSL/TLS endpoints (ssl:// or tcp+tls://)
//! - Never send private keys over the wire

use bitcoin::{consensus, Network, Transaction, Txid};
use electrum_client::{ElectrumApi, Error as ElectrumError};
use thiserror::Error;

// Re-export the raw client for direct usage
pub use electrum_client::Client as RawClient;

/// Errors from broadcast and status operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("No endpoints configured")]
    NoEndpoints,

    #[error("Invalid transaction hex: {0}")]
    InvalidTransaction(String),

    #[error("All {attempts} endpoints failed: {last_error}")]
    AllEndpointsFailed { attempts: usize, last_error: String },

    #[error("Broadcast rejected by all {attempts} endpoints: {last_error}")]
    BroadcastRejected { attempts: usize, last_error: String },
}

/// Submit a signed transaction to the network.
pub trait Broadcaster {
    fn broadcast(&self, tx: &Transaction) -> Result<Txid, Error>;
}

/// Electrum-backed client with linear endpoint fallback.
pub struct FallbackBroadcaster {
    endpoints: Vec<String>,
    network: Network,
}

impl FallbackBroadcaster {
    /// Create a client over an ordered endpoint list.
    ///
    /// Endpoints are tried in the given order on every operation.
    pub fn new(endpoints: Vec<String>, network: Network) -> Result<Self, Error> {
        if endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }
        for url in &endpoints {
            if !url.starts_with("ssl://") && !url.contains("tls") {
                log::warn!("Electrum endpoint {url} is not SSL - insecure for mainnet!");
            }
        }
        Ok(Self { endpoints, network })
    }

    /// Create a client over the default endpoints for a network.
    pub fn with_default_endpoints(network: Network) -> Self {
        Self {
            endpoints: default_endpoints(network)
                .iter()
                .map(|s| s.to_string())
                .collect(),
            network,
        }
    }

    /// Get the network this client is configured for
    pub fn network(&self) -> Network {
        self.network
    }

    /// Configured endpoints, in fallback order.
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Broadcast from raw hex.
    pub fn broadcast_hex(&self, tx_hex: &str) -> Result<Txid, Error> {
        let bytes =
            hex::decode(tx_hex.trim()).map_err(|e| Error::InvalidTransaction(e.to_string()))?;
        let tx: Transaction = consensus::deserialize(&bytes)
            .map_err(|e| Error::InvalidTransaction(e.to_string()))?;
        self.broadcast(&tx)
    }

    /// Get current blockchain height
    pub fn get_height(&self) -> Result<u32, Error> {
        self.with_each(|client| {
            let header = client.block_headers_subscribe()?;
            Ok(header.height as u32)
        })
    }

    /// Check if a transaction is confirmed
    pub fn is_confirmed(&self, txid: &Txid) -> Result<bool, Error> {
        self.with_each(|client| {
            if client.transaction_get(txid).is_err() {
                return Ok(false);
            }
            match client.transaction_get_merkle(txid, 0) {
                Ok(merkle) => Ok(merkle.block_height > 0),
                Err(_) => Ok(false),
            }
        })
    }

    /// Confirmation count for a transaction (0 when unconfirmed or unknown)
    pub fn confirmations(&self, txid: &Txid) -> Result<u32, Error> {
        self.with_each(|client| {
            let tip = client.block_headers_subscribe()?.height as u32;
            match client.transaction_get_merkle(txid, 0) {
                Ok(merkle) if merkle.block_height > 0 => {
                    Ok(tip.saturating_sub(merkle.block_height as u32) + 1)
                }
                _ => Ok(0),
            }
        })
    }

    /// Run an operation against the first endpoint that accepts it,
    /// falling through the list on any error.
    fn with_each<T>(
        &self,
        operation: impl Fn(&RawClient) -> Result<T, ElectrumError>,
    ) -> Result<T, Error> {
        let mut last_error = String::from("no endpoints configured");
        for url in &self.endpoints {
            match electrum_client::Client::new(url) {
                Ok(client) => match operation(&client) {
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        log::warn!("Electrum endpoint {url} failed: {e}");
                        last_error = e.to_string();
                    }
                },
                Err(e) => {
                    log::warn!("Connection to {url} failed: {e}");
                    last_error = e.to_string();
                }
            }
        }
        Err(Error::AllEndpointsFailed {
            attempts: self.endpoints.len(),
            last_error,
        })
    }
}

impl Broadcaster for FallbackBroadcaster {
    fn broadcast(&self, tx: &Transaction) -> Result<Txid, Error> {
        self.with_each(|client| client.transaction_broadcast(tx))
            .map_err(|e| match e {
                Error::AllEndpointsFailed {
                    attempts,
                    last_error,
                } => Error::BroadcastRejected {
                    attempts,
                    last_error,
                },
                other => other,
            })
    }
}

/// Default Electrum endpoints for each network, in fallback order
pub fn default_endpoints(network: Network) -> Vec<&'static str> {
    match network {
        Network::Bitcoin => vec![
            "ssl://electrum.blockstream.info:60002",
            "ssl://electrum.emzy.de:50002",
        ],
        Network::Testnet => vec![
            "ssl://electrum.blockstream.info:60004",
            "ssl://testnet.aranguren.org:51002",
        ],
        Network::Signet => vec!["ssl://mempool.space:60602"],
        Network::Regtest => vec!["tcp://127.0.0.1:60401"],
        _ => vec!["ssl://electrum.blockstream.info:60002"],
    }
}
