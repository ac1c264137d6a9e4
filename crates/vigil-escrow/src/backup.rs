//! EscrowBackup — serializable escrow descriptor shared with the recipient.
//!
//! Contains everything the recipient needs to reconstruct the escrow,
//! find the current UTXO on-chain, and build a disclosure transaction.
//! Delivered out-of-band (encrypted message, physical backup); this module
//! only defines the document.

use bitcoin::{Amount, Network, OutPoint, ScriptBuf, Txid};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::EscrowInstance;
use vigil_script::{EscrowDescriptor, ScriptError, Timelock, TimelockError};

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    #[error("Embedded witness script does not match the embedded keys and timelock")]
    ScriptDescriptorMismatch,

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Timelock error: {0}")]
    Timelock(#[from] TimelockError),
}

/// Serializable escrow backup.
///
/// All byte fields are hex strings so the document survives any transport
/// that can carry JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowBackup {
    /// Format version (for future compatibility)
    pub version: u32,
    /// Bitcoin network
    pub network: String,
    /// Owner's compressed public key (hex)
    pub owner_pubkey: String,
    /// Recipient's compressed public key (hex)
    pub recipient_pubkey: String,
    /// Relative timelock in blocks
    pub timelock_blocks: u16,
    /// Current escrow outpoint
    pub txid: String,
    pub vout: u32,
    /// Current escrow value in satoshis
    pub value_sats: u64,
    /// The witness script the output commits to (hex, for verification)
    pub witness_script_hex: String,
}

/// Current backup format version
pub const BACKUP_VERSION: u32 = 1;

impl EscrowBackup {
    pub fn from_instance(instance: &EscrowInstance, network: Network) -> Self {
        Self {
            version: BACKUP_VERSION,
            network: network.to_string(),
            owner_pubkey: instance.descriptor.owner_pubkey.to_string(),
            recipient_pubkey: instance.descriptor.recipient_pubkey.to_string(),
            timelock_blocks: instance.descriptor.timelock.blocks(),
            txid: instance.utxo.outpoint.txid.to_string(),
            vout: instance.utxo.outpoint.vout,
            value_sats: instance.utxo.value.to_sat(),
            witness_script_hex: instance.descriptor.witness_script().to_hex_string(),
        }
    }

    /// Parse the document back into an instance, verifying that the embedded
    /// script matches the embedded keys and timelock.
    pub fn to_instance(&self) -> Result<(EscrowInstance, Network), BackupError> {
        let network = Network::from_str(&self.network).map_err(|e| BackupError::InvalidField {
            field: "network",
            reason: e.to_string(),
        })?;
        let owner_pubkey =
            PublicKey::from_str(&self.owner_pubkey).map_err(|e| BackupError::InvalidField {
                field: "owner_pubkey",
                reason: e.to_string(),
            })?;
        let recipient_pubkey =
            PublicKey::from_str(&self.recipient_pubkey).map_err(|e| BackupError::InvalidField {
                field: "recipient_pubkey",
                reason: e.to_string(),
            })?;
        let txid = Txid::from_str(&self.txid).map_err(|e| BackupError::InvalidField {
            field: "txid",
            reason: e.to_string(),
        })?;

        let descriptor = EscrowDescriptor::new(
            owner_pubkey,
            recipient_pubkey,
            Timelock::from_blocks(self.timelock_blocks)?,
        );

        let script_bytes =
            hex::decode(&self.witness_script_hex).map_err(|e| BackupError::InvalidField {
                field: "witness_script_hex",
                reason: e.to_string(),
            })?;
        let embedded = EscrowDescriptor::decode(ScriptBuf::from_bytes(script_bytes).as_script())?;
        if embedded != descriptor {
            return Err(BackupError::ScriptDescriptorMismatch);
        }

        Ok((
            EscrowInstance::new(
                OutPoint {
                    txid,
                    vout: self.vout,
                },
                Amount::from_sat(self.value_sats),
                descriptor,
            ),
            network,
        ))
    }
}
