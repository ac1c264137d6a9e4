//! Vigil escrow transaction builders.
//!
//! A vigil escrow is a single P2WSH output governed by the two-branch script
//! from `vigil-script`: the owner can spend it at any time, the recipient
//! only after a relative timelock. The owner proves liveness by periodically
//! *refreshing* — spending the output back into a fresh copy of itself,
//! which restarts the timelock. If refreshes stop, the recipient's
//! pre-built *disclosure* transaction becomes valid and reveals the
//! recovery payload on-chain.
//!
//! # Refresh Chain
//!
//! ```text
//! funding ──> escrow#0 ──refresh──> escrow#1 ──refresh──> escrow#2 ─ ─ ─
//!               │                     │                     │
//!               └── disclosure        └── disclosure        └── disclosure
//!                   (valid after      (invalidated by       (valid after
//!                    ttl blocks)       the refresh)          ttl blocks)
//! ```
//!
//! Each link pays the fee of the transaction creating the next one, so the
//! amount strictly decreases until the chain is exhausted and must be
//! re-funded.
//!
//! Every builder here is a pure function over its inputs: no network, no
//! persistence, no shared state. Broadcasting lives in `vigil-broadcast`;
//! persisting the evolving chain and serializing concurrent refresh attempts
//! is the caller's job.

pub mod backup;
pub mod disclosure;
pub mod fees;
pub mod liveness;
pub mod refresh;
pub mod setup;

use bitcoin::{Amount, OutPoint};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vigil_script::{EscrowDescriptor, ScriptError};

pub use disclosure::{build_disclosure_tx, DisclosureResult};
pub use fees::estimate_refreshes_remaining;
pub use refresh::{build_refresh_tx, RefreshResult};
pub use setup::{build_setup_tx, SetupConfig, SetupResult};

/// Minimum economical output value in satoshis.
pub const DUST_LIMIT_SAT: u64 = 546;

/// Maximum fee rate we'll accept (sat/vB). Protects against malicious fee data.
pub const MAX_FEE_RATE: f64 = 500.0;

#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("Output of {0} is below the dust limit ({DUST_LIMIT_SAT} sat)")]
    DustOutput(Amount),

    #[error("Escrow value {0} cannot fund another refresh above the dust limit")]
    ChainExhausted(Amount),

    #[error("Timelock mismatch: script encodes {in_script} blocks, caller requested {requested}")]
    TtlMismatch { in_script: u16, requested: u16 },

    #[error("Unsupported funding script type (only P2WPKH funding is accepted)")]
    UnsupportedFundingScript,

    #[error("Funding output is not controlled by the provided owner key")]
    ForeignFundingOutput,

    #[error("Signing key does not match the script's {0} key")]
    KeyMismatch(&'static str),

    #[error("Fee rate {0} sat/vB is outside the accepted range (0, {MAX_FEE_RATE}]")]
    InvalidFeeRate(f64),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Sighash computation failed: {0}")]
    Sighash(String),
}

/// A spendable escrow output, observed on-chain or computed pre-broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowUtxo {
    /// The outpoint (txid:vout)
    pub outpoint: OutPoint,
    /// Value in satoshis
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
}

/// One link of the refresh chain: a funded output plus the script that
/// governs it. Immutable; a refresh produces the next instance, it never
/// mutates this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowInstance {
    pub utxo: EscrowUtxo,
    pub descriptor: EscrowDescriptor,
}

impl EscrowInstance {
    pub fn new(outpoint: OutPoint, value: Amount, descriptor: EscrowDescriptor) -> Self {
        Self {
            utxo: EscrowUtxo { outpoint, value },
            descriptor,
        }
    }
}

pub(crate) fn check_fee_rate(fee_rate: f64) -> Result<(), EscrowError> {
    if !fee_rate.is_finite() || fee_rate <= 0.0 || fee_rate > MAX_FEE_RATE {
        return Err(EscrowError::InvalidFeeRate(fee_rate));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_utils {
    use secp256k1::{PublicKey, Secp256k1, SecretKey};

    pub fn test_keypair(seed: u8) -> (SecretKey, PublicKey) {
        let secp = Secp256k1::new();
        let mut bytes = [0u8; 32];
        bytes[31] = seed;
        bytes[0] = 0x01;
        let sk = SecretKey::from_slice(&bytes).unwrap();
        let pk = sk.public_key(&secp);
        (sk, pk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash as _;
    use bitcoin::Txid;
    use crate::test_utils::test_keypair;
    use vigil_script::Timelock;

    #[test]
    fn test_fee_rate_bounds() {
        assert!(check_fee_rate(1.0).is_ok());
        assert!(check_fee_rate(MAX_FEE_RATE).is_ok());
        assert!(check_fee_rate(0.0).is_err());
        assert!(check_fee_rate(-5.0).is_err());
        assert!(check_fee_rate(MAX_FEE_RATE + 1.0).is_err());
        assert!(check_fee_rate(f64::NAN).is_err());
    }

    #[test]
    fn test_instance_serde_roundtrip() {
        let (_, owner) = test_keypair(1);
        let (_, recipient) = test_keypair(2);
        let instance = EscrowInstance::new(
            OutPoint {
                txid: Txid::from_byte_array([0xAA; 32]),
                vout: 0,
            },
            Amount::from_sat(100_000),
            EscrowDescriptor::new(owner, recipient, Timelock::thirty_days()),
        );

        let json = serde_json::to_string(&instance).unwrap();
        let restored: EscrowInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(instance, restored);
        assert_eq!(restored.utxo.value.to_sat(), 100_000);
    }
}
