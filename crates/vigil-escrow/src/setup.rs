//! Escrow setup: fund the first link of a refresh chain.
//!
//! Spends one external P2WPKH funding UTXO belonging to the owner into the
//! escrow's P2WSH output. Remainder above dust goes to a caller-supplied
//! change script; at or below dust (or with no change script) it is folded
//! into the fee.

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash as _;
use bitcoin::key::CompressedPublicKey;
use bitcoin::sighash::SighashCache;
use bitcoin::transaction::Version;
use bitcoin::{
    consensus, Address, Amount, EcdsaSighashType, Network, OutPoint, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness,
};
use secp256k1::{Message, Secp256k1, SecretKey};

use crate::fees::{estimate_setup_vbytes, fee_for_vbytes};
use crate::{check_fee_rate, EscrowError, EscrowInstance, DUST_LIMIT_SAT};
use vigil_script::EscrowDescriptor;

/// Inputs for building the funding-to-escrow transaction.
pub struct SetupConfig {
    /// Escrow script parameters (owner, recipient, timelock).
    pub descriptor: EscrowDescriptor,
    /// Value to lock in the escrow output.
    pub amount: Amount,
    /// The external funding UTXO being spent. Must be a P2WPKH output
    /// controlled by the owner key.
    pub funding_outpoint: OutPoint,
    pub funding_txout: TxOut,
    /// Where to send any remainder above dust. `None` folds the remainder
    /// into the fee.
    pub change_script: Option<ScriptBuf>,
    /// Fee rate in sat/vB.
    pub fee_rate: f64,
    /// Target network (used to derive the owner's funding address form).
    pub network: Network,
}

/// A signed, broadcast-ready setup transaction.
pub struct SetupResult {
    pub tx: Transaction,
    /// Pre-broadcast txid, computed from the signed transaction.
    pub txid: Txid,
    /// Index of the escrow output in `tx` (always 0).
    pub vout: u32,
    /// The witness script the escrow output commits to.
    pub witness_script: ScriptBuf,
    /// The chain's root instance, ready to hand to the refresh and
    /// disclosure builders once confirmed.
    pub instance: EscrowInstance,
    pub fee: Amount,
}

impl SetupResult {
    /// Raw transaction hex for broadcast.
    pub fn tx_hex(&self) -> String {
        consensus::encode::serialize_hex(&self.tx)
    }
}

/// Build and sign the funding-to-escrow transaction.
pub fn build_setup_tx(config: &SetupConfig, owner_sk: &SecretKey) -> Result<SetupResult, EscrowError> {
    check_fee_rate(config.fee_rate)?;

    let secp = Secp256k1::new();
    let owner_pk = owner_sk.public_key(&secp);
    if owner_pk != config.descriptor.owner_pubkey {
        return Err(EscrowError::KeyMismatch("owner"));
    }

    let funding_spk = &config.funding_txout.script_pubkey;
    if !funding_spk.is_p2wpkh() {
        return Err(EscrowError::UnsupportedFundingScript);
    }
    let owner_funding_spk =
        Address::p2wpkh(&CompressedPublicKey(owner_pk), config.network).script_pubkey();
    if *funding_spk != owner_funding_spk {
        return Err(EscrowError::ForeignFundingOutput);
    }

    if config.amount.to_sat() < DUST_LIMIT_SAT {
        return Err(EscrowError::DustOutput(config.amount));
    }

    let available = config.funding_txout.value;

    // Try the change-bearing shape first; fall back to folding the
    // remainder into the fee when it would be dust.
    let fee_with_change = fee_for_vbytes(estimate_setup_vbytes(true), config.fee_rate);
    let fee_without_change = fee_for_vbytes(estimate_setup_vbytes(false), config.fee_rate);

    let needed = config.amount + fee_without_change;
    if available < needed {
        return Err(EscrowError::InsufficientFunds { needed, available });
    }

    let change = config
        .change_script
        .as_ref()
        .and_then(|_| available.checked_sub(config.amount + fee_with_change))
        .filter(|change| change.to_sat() >= DUST_LIMIT_SAT);

    let mut outputs = vec![TxOut {
        value: config.amount,
        script_pubkey: config.descriptor.script_pubkey(),
    }];
    if let Some(change) = change {
        outputs.push(TxOut {
            value: change,
            // Checked by the and_then above
            script_pubkey: config.change_script.clone().unwrap_or_default(),
        });
    }
    let fee = match change {
        Some(change) => available - config.amount - change,
        None => available - config.amount,
    };

    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: config.funding_outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        }],
        output: outputs,
    };

    // BIP-143 signature over the P2WPKH funding input
    let sighash = SighashCache::new(&tx)
        .p2wpkh_signature_hash(0, funding_spk, available, EcdsaSighashType::All)
        .map_err(|e| EscrowError::Sighash(e.to_string()))?;
    let msg = Message::from_digest(sighash.to_byte_array());
    let signature = bitcoin::ecdsa::Signature {
        signature: secp.sign_ecdsa(&msg, owner_sk),
        sighash_type: EcdsaSighashType::All,
    };

    let mut witness = Witness::new();
    witness.push(signature.to_vec());
    witness.push(owner_pk.serialize());
    tx.input[0].witness = witness;

    let txid = tx.compute_txid();
    let witness_script = config.descriptor.witness_script();
    log::debug!(
        "setup tx {} locks {} behind {} for {}",
        txid,
        config.amount,
        config.descriptor.timelock,
        fee
    );

    Ok(SetupResult {
        instance: EscrowInstance::new(
            OutPoint { txid, vout: 0 },
            config.amount,
            config.descriptor,
        ),
        tx,
        txid,
        vout: 0,
        witness_script,
        fee,
    })
}
