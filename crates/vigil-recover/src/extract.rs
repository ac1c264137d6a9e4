//! Payload extraction from a broadcast disclosure transaction.
//!
//! Deliberately minimal: the transaction is consensus-decoded (which takes
//! care of the segwit marker/flag pair and compact-size counts) and only
//! its output scripts are inspected. No signature validation, no txid
//! recomputation, no witness interpretation happens here — recovering a
//! payload from an unconfirmed or malleated transaction is out of scope,
//! and this module must not grow into a general-purpose transaction
//! parser.

use bitcoin::{consensus, Transaction};
use thiserror::Error;

use vigil_script::RecoveryPayload;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Transaction decode failed: {0}")]
    MalformedTransaction(String),

    #[error("No 64-byte recovery payload output in transaction")]
    PayloadNotFound,
}

/// Decode a raw transaction from hex.
pub fn decode_transaction(tx_hex: &str) -> Result<Transaction, ExtractError> {
    let bytes = hex::decode(tx_hex.trim())
        .map_err(|e| ExtractError::MalformedTransaction(e.to_string()))?;
    consensus::deserialize(&bytes).map_err(|e| ExtractError::MalformedTransaction(e.to_string()))
}

/// Scan a transaction's outputs for the recovery payload: an OP_RETURN
/// script pushing exactly 64 bytes. Outputs with OP_RETURN pushes of any
/// other length do not match.
pub fn find_payload(tx: &Transaction) -> Result<RecoveryPayload, ExtractError> {
    tx.output
        .iter()
        .find_map(|output| RecoveryPayload::from_script(&output.script_pubkey).ok())
        .ok_or(ExtractError::PayloadNotFound)
}

/// Decode a transaction hex and pull its recovery payload in one step.
pub fn extract_payload(tx_hex: &str) -> Result<RecoveryPayload, ExtractError> {
    find_payload(&decode_transaction(tx_hex)?)
}
