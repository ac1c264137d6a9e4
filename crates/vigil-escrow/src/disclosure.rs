//! Disclosure: the recipient's pre-built, timelocked spend.
//!
//! Spends the current escrow instance through the script's false branch and
//! embeds the 64-byte recovery payload in a zero-value output. The input's
//! sequence field carries the timelock value — that is what makes the CSV
//! check in the script satisfiable, and it also means the transaction is
//! simply invalid until the escrow output has aged `ttl` blocks.
//!
//! Once mature, anyone can broadcast it. The owner's continued inaction is
//! sufficient; no owner cooperation is involved at disclosure time.

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash as _;
use bitcoin::sighash::SighashCache;
use bitcoin::transaction::Version;
use bitcoin::{
    consensus, Address, Amount, EcdsaSighashType, ScriptBuf, Transaction, TxIn, TxOut, Txid,
    Witness,
};
use secp256k1::{Message, Secp256k1, SecretKey};

use crate::fees::{estimate_disclosure_vbytes, fee_for_vbytes};
use crate::{check_fee_rate, EscrowError, EscrowInstance, DUST_LIMIT_SAT};
use vigil_script::{RecoveryPayload, Timelock};

/// A signed disclosure transaction, inert until the timelock matures.
pub struct DisclosureResult {
    pub tx: Transaction,
    pub txid: Txid,
    /// Value paid to the recipient's destination (escrow value minus fee).
    pub payout: Amount,
    pub fee: Amount,
}

impl DisclosureResult {
    /// Raw transaction hex, suitable for storing until the timelock matures.
    pub fn tx_hex(&self) -> String {
        consensus::encode::serialize_hex(&self.tx)
    }
}

/// Build and sign the disclosure transaction for the current escrow
/// instance.
///
/// `timelock` must match the value encoded in the instance's script; the
/// mismatch error exists because the caller typically resubmits its
/// configured waiting period rather than re-deriving it from the script.
pub fn build_disclosure_tx(
    instance: &EscrowInstance,
    recipient_sk: &SecretKey,
    destination: &Address,
    timelock: Timelock,
    payload: &RecoveryPayload,
    fee_rate: f64,
) -> Result<DisclosureResult, EscrowError> {
    check_fee_rate(fee_rate)?;

    if timelock != instance.descriptor.timelock {
        return Err(EscrowError::TtlMismatch {
            in_script: instance.descriptor.timelock.blocks(),
            requested: timelock.blocks(),
        });
    }

    let secp = Secp256k1::new();
    if recipient_sk.public_key(&secp) != instance.descriptor.recipient_pubkey {
        return Err(EscrowError::KeyMismatch("recipient"));
    }

    let destination_script = destination.script_pubkey();
    let vbytes = estimate_disclosure_vbytes(destination_script.len());
    let fee = fee_for_vbytes(vbytes, fee_rate);

    let payout = instance
        .utxo
        .value
        .checked_sub(fee)
        .filter(|payout| payout.to_sat() >= DUST_LIMIT_SAT)
        .ok_or(EscrowError::DustOutput(
            instance.utxo.value.checked_sub(fee).unwrap_or(Amount::ZERO),
        ))?;

    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: instance.utxo.outpoint,
            script_sig: ScriptBuf::new(),
            // Carries the CSV value; also what delays validity by ttl blocks.
            sequence: timelock.to_sequence(),
            witness: Witness::new(),
        }],
        output: vec![
            TxOut {
                value: Amount::ZERO,
                script_pubkey: payload.to_script(),
            },
            TxOut {
                value: payout,
                script_pubkey: destination_script,
            },
        ],
    };

    let witness_script = instance.descriptor.witness_script();
    let sighash = SighashCache::new(&tx)
        .p2wsh_signature_hash(0, &witness_script, instance.utxo.value, EcdsaSighashType::All)
        .map_err(|e| EscrowError::Sighash(e.to_string()))?;
    let msg = Message::from_digest(sighash.to_byte_array());
    let signature = bitcoin::ecdsa::Signature {
        signature: secp.sign_ecdsa(&msg, recipient_sk),
        sighash_type: EcdsaSighashType::All,
    };

    // [signature, <empty>, witness script] — the empty second item steers
    // evaluation into the ELSE (disclosure) branch.
    let mut witness = Witness::new();
    witness.push(signature.to_vec());
    witness.push(&[] as &[u8]);
    witness.push(witness_script.as_bytes());
    tx.input[0].witness = witness;

    let txid = tx.compute_txid();
    log::debug!(
        "disclosure tx {} pays {} after {} of owner silence",
        txid,
        payout,
        instance.descriptor.timelock
    );

    Ok(DisclosureResult {
        tx,
        txid,
        payout,
        fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_keypair;
    use bitcoin::key::CompressedPublicKey;
    use bitcoin::{Network, OutPoint};
    use vigil_script::EscrowDescriptor;

    fn test_instance(sats: u64) -> (EscrowInstance, SecretKey, SecretKey) {
        let (owner_sk, owner_pk) = test_keypair(1);
        let (recipient_sk, recipient_pk) = test_keypair(2);
        let instance = EscrowInstance::new(
            OutPoint {
                txid: Txid::from_byte_array([0xCC; 32]),
                vout: 0,
            },
            Amount::from_sat(sats),
            EscrowDescriptor::new(owner_pk, recipient_pk, Timelock::thirty_days()),
        );
        (instance, owner_sk, recipient_sk)
    }

    fn destination() -> Address {
        let (_, pk) = test_keypair(7);
        Address::p2wpkh(&CompressedPublicKey(pk), Network::Testnet)
    }

    fn payload() -> RecoveryPayload {
        RecoveryPayload::new([0x42; 32], [0x24; 32])
    }

    #[test]
    fn test_disclosure_shape() {
        let (instance, _, recipient_sk) = test_instance(100_000);
        let result = build_disclosure_tx(
            &instance,
            &recipient_sk,
            &destination(),
            Timelock::thirty_days(),
            &payload(),
            5.0,
        )
        .unwrap();

        // Input sequence equals the script's timelock value
        assert_eq!(
            result.tx.input[0].sequence,
            Timelock::thirty_days().to_sequence()
        );

        // Output 0: zero-value payload output
        assert_eq!(result.tx.output[0].value, Amount::ZERO);
        let recovered = RecoveryPayload::from_script(&result.tx.output[0].script_pubkey).unwrap();
        assert_eq!(recovered, payload());

        // Output 1: payout = value - fee
        assert_eq!(result.tx.output[1].value, result.payout);
        assert_eq!(result.payout + result.fee, Amount::from_sat(100_000));

        // Witness: [signature, empty, witness script]
        let witness: Vec<_> = result.tx.input[0].witness.iter().collect();
        assert_eq!(witness.len(), 3);
        assert!(witness[0].len() >= 70, "DER signature + sighash byte");
        assert_eq!(witness[1].len(), 0, "empty item selects the ELSE branch");
        assert_eq!(witness[2], instance.descriptor.witness_script().as_bytes());
    }

    #[test]
    fn test_disclosure_rejects_ttl_mismatch() {
        let (instance, _, recipient_sk) = test_instance(100_000);
        let result = build_disclosure_tx(
            &instance,
            &recipient_sk,
            &destination(),
            Timelock::six_months(),
            &payload(),
            5.0,
        );
        assert!(matches!(
            result,
            Err(EscrowError::TtlMismatch {
                in_script: 4320,
                requested: 26_280
            })
        ));
    }

    #[test]
    fn test_disclosure_rejects_wrong_key() {
        let (instance, owner_sk, _) = test_instance(100_000);
        let result = build_disclosure_tx(
            &instance,
            &owner_sk,
            &destination(),
            Timelock::thirty_days(),
            &payload(),
            5.0,
        );
        assert!(matches!(result, Err(EscrowError::KeyMismatch("recipient"))));
    }

    #[test]
    fn test_disclosure_rejects_dust_payout() {
        // 1500 sat escrow at 5 sat/vB leaves ~500 sat: below dust.
        let (instance, _, recipient_sk) = test_instance(1_500);
        let result = build_disclosure_tx(
            &instance,
            &recipient_sk,
            &destination(),
            Timelock::thirty_days(),
            &payload(),
            5.0,
        );
        assert!(matches!(result, Err(EscrowError::DustOutput(_))));
    }

    #[test]
    fn test_disclosure_rejects_fee_above_value() {
        let (instance, _, recipient_sk) = test_instance(600);
        let result = build_disclosure_tx(
            &instance,
            &recipient_sk,
            &destination(),
            Timelock::thirty_days(),
            &payload(),
            5.0,
        );
        assert!(matches!(result, Err(EscrowError::DustOutput(_))));
    }

    #[test]
    fn test_disclosure_hex_reparses() {
        let (instance, _, recipient_sk) = test_instance(100_000);
        let result = build_disclosure_tx(
            &instance,
            &recipient_sk,
            &destination(),
            Timelock::thirty_days(),
            &payload(),
            5.0,
        )
        .unwrap();
        let bytes = hex::decode(result.tx_hex()).unwrap();
        let decoded: Transaction = consensus::deserialize(&bytes).unwrap();
        assert_eq!(decoded.compute_txid(), result.txid);
        assert_eq!(decoded.input[0].witness.len(), 3);
    }
}
