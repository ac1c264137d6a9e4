//! Refresh: the owner's liveness proof.
//!
//! Spends the current escrow instance through the script's true branch and
//! recreates the escrow output under the same keys, minus the fee. The
//! disclosure path's CSV is measured from the *new* output's confirmation
//! height, so every confirmed refresh restarts the waiting window.
//!
//! The timelock may be resubmitted unchanged or updated; the keys may not
//! change within a chain.
//!
//! # Late refreshes
//!
//! A refresh built after the disclosure transaction has already matured
//! still spends the same outpoint: both transactions are then valid and
//! whichever confirms first wins. This module builds the refresh either
//! way — racing a matured disclosure is a protocol-level situation for the
//! caller to surface, not an encoding error.

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash as _;
use bitcoin::sighash::SighashCache;
use bitcoin::transaction::Version;
use bitcoin::{
    consensus, Amount, EcdsaSighashType, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Txid, Witness,
};
use secp256k1::{Message, Secp256k1, SecretKey};

use crate::fees::{estimate_refresh_vbytes, fee_for_vbytes};
use crate::{check_fee_rate, EscrowError, EscrowInstance, DUST_LIMIT_SAT};
use vigil_script::{EscrowDescriptor, Timelock};

/// A signed refresh transaction and the chain link it creates.
pub struct RefreshResult {
    pub tx: Transaction,
    pub txid: Txid,
    /// Index of the recreated escrow output in `tx` (always 0).
    pub vout: u32,
    /// The witness script of the recreated output.
    pub witness_script: ScriptBuf,
    /// The next chain link, ready for the following refresh or for a new
    /// disclosure transaction once confirmed.
    pub instance: EscrowInstance,
    pub fee: Amount,
}

impl RefreshResult {
    /// Raw transaction hex for broadcast.
    pub fn tx_hex(&self) -> String {
        consensus::encode::serialize_hex(&self.tx)
    }
}

/// Build and sign a refresh of the current escrow instance.
///
/// `next_timelock` of `None` keeps the current waiting period; `Some`
/// re-encodes the new escrow output with an updated one.
pub fn build_refresh_tx(
    instance: &EscrowInstance,
    owner_sk: &SecretKey,
    next_timelock: Option<Timelock>,
    fee_rate: f64,
) -> Result<RefreshResult, EscrowError> {
    check_fee_rate(fee_rate)?;

    let secp = Secp256k1::new();
    if owner_sk.public_key(&secp) != instance.descriptor.owner_pubkey {
        return Err(EscrowError::KeyMismatch("owner"));
    }

    let fee = fee_for_vbytes(estimate_refresh_vbytes(), fee_rate);
    let next_value = instance
        .utxo
        .value
        .checked_sub(fee)
        .filter(|value| value.to_sat() >= DUST_LIMIT_SAT)
        .ok_or(EscrowError::ChainExhausted(instance.utxo.value))?;

    let next_descriptor = EscrowDescriptor::new(
        instance.descriptor.owner_pubkey,
        instance.descriptor.recipient_pubkey,
        next_timelock.unwrap_or(instance.descriptor.timelock),
    );

    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: instance.utxo.outpoint,
            script_sig: ScriptBuf::new(),
            // Owner branch has no CSV; leave relative locktime disabled.
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: next_value,
            script_pubkey: next_descriptor.script_pubkey(),
        }],
    };

    let witness_script = instance.descriptor.witness_script();
    let sighash = SighashCache::new(&tx)
        .p2wsh_signature_hash(0, &witness_script, instance.utxo.value, EcdsaSighashType::All)
        .map_err(|e| EscrowError::Sighash(e.to_string()))?;
    let msg = Message::from_digest(sighash.to_byte_array());
    let signature = bitcoin::ecdsa::Signature {
        signature: secp.sign_ecdsa(&msg, owner_sk),
        sighash_type: EcdsaSighashType::All,
    };

    // [signature, <0x01>, witness script] — the non-empty second item steers
    // evaluation into the IF (owner) branch.
    let mut witness = Witness::new();
    witness.push(signature.to_vec());
    witness.push([0x01u8]);
    witness.push(witness_script.as_bytes());
    tx.input[0].witness = witness;

    let txid = tx.compute_txid();
    let next_witness_script = next_descriptor.witness_script();
    log::debug!(
        "refresh tx {} rolls {} -> {} ({} fee)",
        txid,
        instance.utxo.value,
        next_value,
        fee
    );

    Ok(RefreshResult {
        instance: EscrowInstance::new(OutPoint { txid, vout: 0 }, next_value, next_descriptor),
        tx,
        txid,
        vout: 0,
        witness_script: next_witness_script,
        fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::REFRESH_TX_VBYTES;
    use crate::test_utils::test_keypair;

    fn test_instance(sats: u64) -> (EscrowInstance, SecretKey) {
        let (owner_sk, owner_pk) = test_keypair(1);
        let (_, recipient_pk) = test_keypair(2);
        let instance = EscrowInstance::new(
            OutPoint {
                txid: Txid::from_byte_array([0xDD; 32]),
                vout: 0,
            },
            Amount::from_sat(sats),
            EscrowDescriptor::new(owner_pk, recipient_pk, Timelock::thirty_days()),
        );
        (instance, owner_sk)
    }

    #[test]
    fn test_refresh_recreates_escrow() {
        let (instance, owner_sk) = test_instance(100_000);
        let result = build_refresh_tx(&instance, &owner_sk, None, 5.0).unwrap();

        // Same script, new outpoint, value reduced by exactly the fee
        assert_eq!(result.vout, 0);
        assert_eq!(
            result.tx.output[0].script_pubkey,
            instance.descriptor.script_pubkey()
        );
        assert_eq!(result.instance.descriptor, instance.descriptor);
        assert_eq!(
            result.instance.utxo.value + result.fee,
            instance.utxo.value
        );
        assert_eq!(result.instance.utxo.outpoint.txid, result.txid);

        // Witness: [signature, 0x01, witness script]
        let witness: Vec<_> = result.tx.input[0].witness.iter().collect();
        assert_eq!(witness.len(), 3);
        assert_eq!(witness[1], [0x01u8]);
        assert_eq!(witness[2], instance.descriptor.witness_script().as_bytes());

        // Owner branch carries no relative locktime
        assert!(!result.tx.input[0].sequence.is_relative_lock_time());
    }

    #[test]
    fn test_refresh_with_updated_timelock() {
        let (instance, owner_sk) = test_instance(100_000);
        let result =
            build_refresh_tx(&instance, &owner_sk, Some(Timelock::six_months()), 5.0).unwrap();

        assert_eq!(
            result.instance.descriptor.timelock,
            Timelock::six_months()
        );
        // Keys unchanged
        assert_eq!(
            result.instance.descriptor.owner_pubkey,
            instance.descriptor.owner_pubkey
        );
        assert_eq!(
            result.instance.descriptor.recipient_pubkey,
            instance.descriptor.recipient_pubkey
        );
        // Output commits to the *new* script
        assert_ne!(
            result.tx.output[0].script_pubkey,
            instance.descriptor.script_pubkey()
        );
        assert_eq!(
            result.tx.output[0].script_pubkey,
            result.instance.descriptor.script_pubkey()
        );
    }

    #[test]
    fn test_refresh_chain_strictly_decreases() {
        let (mut instance, owner_sk) = test_instance(100_000);
        let mut last_value = instance.utxo.value;
        for _ in 0..3 {
            let result = build_refresh_tx(&instance, &owner_sk, None, 5.0).unwrap();
            assert!(result.instance.utxo.value < last_value);
            assert_eq!(result.instance.descriptor, instance.descriptor);
            last_value = result.instance.utxo.value;
            instance = result.instance;
        }
    }

    #[test]
    fn test_refresh_exhausted_chain() {
        let fee = REFRESH_TX_VBYTES * 5;
        // Remainder lands just under the dust limit
        let (instance, owner_sk) = test_instance(fee + DUST_LIMIT_SAT - 1);
        assert!(matches!(
            build_refresh_tx(&instance, &owner_sk, None, 5.0),
            Err(EscrowError::ChainExhausted(_))
        ));

        // And just at it succeeds
        let (instance, owner_sk) = test_instance(fee + DUST_LIMIT_SAT);
        let result = build_refresh_tx(&instance, &owner_sk, None, 5.0).unwrap();
        assert_eq!(result.instance.utxo.value.to_sat(), DUST_LIMIT_SAT);
    }

    #[test]
    fn test_refresh_value_below_fee() {
        let (instance, owner_sk) = test_instance(100);
        assert!(matches!(
            build_refresh_tx(&instance, &owner_sk, None, 5.0),
            Err(EscrowError::ChainExhausted(_))
        ));
    }

    #[test]
    fn test_refresh_rejects_wrong_key() {
        let (instance, _) = test_instance(100_000);
        let (stranger_sk, _) = test_keypair(9);
        assert!(matches!(
            build_refresh_tx(&instance, &stranger_sk, None, 5.0),
            Err(EscrowError::KeyMismatch("owner"))
        ));
    }

    #[test]
    fn test_refresh_hex_reparses() {
        let (instance, owner_sk) = test_instance(100_000);
        let result = build_refresh_tx(&instance, &owner_sk, None, 5.0).unwrap();
        let bytes = hex::decode(result.tx_hex()).unwrap();
        let decoded: Transaction = consensus::deserialize(&bytes).unwrap();
        assert_eq!(decoded.compute_txid(), result.txid);
    }
}
