//! Transaction size and chain lifetime estimation.
//!
//! Sizes are computed from weight units and converted to virtual bytes.
//! Witness items count 1 WU per byte, everything else 4 WU.

use bitcoin::Amount;

/// Estimated virtual size of a refresh transaction (one escrow input spent
/// via the owner branch, one P2WSH output).
///
/// Weight breakdown:
///   overhead: version(4) + locktime(4) + counts(2) = 40 WU, marker/flag 2 WU
///   input base: outpoint(36) + script_sig len(1) + sequence(4) = 164 WU
///   input witness: items(1) + sig(1+72) + branch marker(1+1) + script(1+79) = 156 WU
///   output: value(8) + len(1) + P2WSH script(34) = 172 WU
/// Total: 534 WU -> 134 vB
pub const REFRESH_TX_VBYTES: u64 = 134;

/// Virtual size of a P2WPKH input (base 164 WU + witness 108 WU).
const P2WPKH_INPUT_VBYTES: f64 = 68.0;

/// Virtual size of an escrow-path P2WSH input (see [`REFRESH_TX_VBYTES`]).
const ESCROW_INPUT_VBYTES: f64 = 80.0;

/// Virtual size of a P2WSH output.
const P2WSH_OUTPUT_VBYTES: f64 = 43.0;

/// Virtual size of a P2WPKH output.
const P2WPKH_OUTPUT_VBYTES: f64 = 31.0;

/// Non-input, non-output transaction overhead (including segwit marker/flag).
const OVERHEAD_VBYTES: f64 = 10.5;

/// Estimate vbytes for a setup transaction: one P2WPKH funding input, the
/// escrow output, and optionally a change output back to the owner.
pub fn estimate_setup_vbytes(with_change: bool) -> f64 {
    let change = if with_change { P2WPKH_OUTPUT_VBYTES } else { 0.0 };
    OVERHEAD_VBYTES + P2WPKH_INPUT_VBYTES + P2WSH_OUTPUT_VBYTES + change
}

/// Estimate vbytes for a refresh transaction.
pub fn estimate_refresh_vbytes() -> f64 {
    REFRESH_TX_VBYTES as f64
}

/// Estimate vbytes for a disclosure transaction: one escrow-path input, the
/// 64-byte payload output, and a destination output of the given script
/// length.
pub fn estimate_disclosure_vbytes(destination_script_len: usize) -> f64 {
    // Payload output: value(8) + len(1) + OP_RETURN script(66)
    let payload_output = 75.0;
    let destination_output = (8 + 1 + destination_script_len) as f64;
    OVERHEAD_VBYTES + ESCROW_INPUT_VBYTES + payload_output + destination_output
}

/// Fee for an estimated size at a given rate, rounded up.
pub fn fee_for_vbytes(vbytes: f64, fee_rate: f64) -> Amount {
    Amount::from_sat((vbytes * fee_rate).ceil() as u64)
}

/// How many refresh cycles the current escrow value can still pay for at the
/// given fee rate. Deterministic, no I/O; floored at zero.
///
/// A zero fee rate is treated as unpayable input data and yields zero rather
/// than an unbounded lifetime.
pub fn estimate_refreshes_remaining(amount_sats: u64, fee_rate_sat_vb: u64) -> u64 {
    amount_sats
        .checked_div(REFRESH_TX_VBYTES * fee_rate_sat_vb)
        .unwrap_or(0)
}
