//! Two-branch escrow witness script codec.
//!
//! # Script Structure
//!
//! ```text
//! OP_IF
//!     <owner_pubkey 33B> OP_CHECKSIG
//! OP_ELSE
//!     <ttl_blocks> OP_CHECKSEQUENCEVERIFY OP_DROP
//!     <recipient_pubkey 33B> OP_CHECKSIG
//! OP_ENDIF
//! ```
//!
//! The true branch lets the owner spend at any time (a refresh). The false
//! branch lets the recipient spend, but only once `ttl_blocks` blocks have
//! passed since the output's own confirmation (a disclosure). Every refresh
//! recreates the output and therefore restarts the clock.
//!
//! # Canonical Encoding
//!
//! The encoding is deterministic and minimal. [`EscrowDescriptor::decode`]
//! parses the template and then re-encodes the result, rejecting the input
//! unless the bytes are identical. That one check enforces minimal pushes,
//! correct key lengths, and exact opcode order, and it guarantees
//! `decode(encode(d)) == d` and `encode(decode(s)) == s` for every script
//! this crate ever accepts from storage.

use bitcoin::opcodes::all::{
    OP_CHECKSIG, OP_CSV, OP_DROP, OP_ELSE, OP_ENDIF, OP_IF, OP_PUSHNUM_1, OP_PUSHNUM_16,
};
use bitcoin::opcodes::Opcode;
use bitcoin::script::{Builder, Instruction, Instructions, Script, ScriptBuf};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timelock::{Timelock, TimelockError};

/// Compressed secp256k1 public key length
const KEY_LEN: usize = 33;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Malformed escrow script: {0}")]
    Malformed(&'static str),

    #[error("Invalid public key in script: {0}")]
    InvalidKey(#[from] secp256k1::Error),

    #[error("Invalid timelock in script: {0}")]
    Timelock(#[from] TimelockError),
}

/// The parameters that fully determine one escrow script.
///
/// Two descriptors are equal exactly when their witness scripts are
/// byte-identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowDescriptor {
    /// Key that can spend at any time (refresh path)
    pub owner_pubkey: PublicKey,
    /// Key that can spend after the timelock (disclosure path)
    pub recipient_pubkey: PublicKey,
    /// Relative timelock on the disclosure path
    pub timelock: Timelock,
}

impl EscrowDescriptor {
    pub fn new(owner_pubkey: PublicKey, recipient_pubkey: PublicKey, timelock: Timelock) -> Self {
        Self {
            owner_pubkey,
            recipient_pubkey,
            timelock,
        }
    }

    /// Encode the two-branch witness script.
    ///
    /// `Builder` emits minimal pushes (`OP_PUSHNUM` for values 1–16, shortest
    /// script-number encoding above that), so the output is canonical.
    pub fn witness_script(&self) -> ScriptBuf {
        Builder::new()
            .push_opcode(OP_IF)
            .push_slice(self.owner_pubkey.serialize())
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_ELSE)
            .push_int(self.timelock.blocks() as i64)
            .push_opcode(OP_CSV)
            .push_opcode(OP_DROP)
            .push_slice(self.recipient_pubkey.serialize())
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_ENDIF)
            .into_script()
    }

    /// The P2WSH output script committing to [`Self::witness_script`].
    pub fn script_pubkey(&self) -> ScriptBuf {
        self.witness_script().to_p2wsh()
    }

    /// Decode a witness script back into its descriptor.
    ///
    /// Fails with [`ScriptError::Malformed`] on any deviation from the
    /// two-branch template, including non-minimal encodings of the timelock
    /// value.
    pub fn decode(script: &Script) -> Result<Self, ScriptError> {
        let mut instructions = script.instructions();

        expect_op(&mut instructions, OP_IF)?;
        let owner_pubkey = expect_key(&mut instructions)?;
        expect_op(&mut instructions, OP_CHECKSIG)?;
        expect_op(&mut instructions, OP_ELSE)?;
        let blocks = expect_timelock_value(&mut instructions)?;
        expect_op(&mut instructions, OP_CSV)?;
        expect_op(&mut instructions, OP_DROP)?;
        let recipient_pubkey = expect_key(&mut instructions)?;
        expect_op(&mut instructions, OP_CHECKSIG)?;
        expect_op(&mut instructions, OP_ENDIF)?;
        if instructions.next().is_some() {
            return Err(ScriptError::Malformed("data after OP_ENDIF"));
        }

        let blocks =
            u16::try_from(blocks).map_err(|_| TimelockError::InvalidBlocks(blocks))?;
        let descriptor = Self {
            owner_pubkey,
            recipient_pubkey,
            timelock: Timelock::from_blocks(blocks)?,
        };

        // Canonical-encoding check: the loose parse above accepts padded
        // timelock pushes; re-encoding catches them.
        if descriptor.witness_script().as_script() != script {
            return Err(ScriptError::Malformed("non-canonical encoding"));
        }

        Ok(descriptor)
    }
}

fn next_instruction<'a>(iter: &mut Instructions<'a>) -> Result<Instruction<'a>, ScriptError> {
    match iter.next() {
        Some(Ok(instruction)) => Ok(instruction),
        Some(Err(_)) => Err(ScriptError::Malformed("undecodable instruction")),
        None => Err(ScriptError::Malformed("script truncated")),
    }
}

fn expect_op(iter: &mut Instructions<'_>, expected: Opcode) -> Result<(), ScriptError> {
    match next_instruction(iter)? {
        Instruction::Op(op) if op == expected => Ok(()),
        _ => Err(ScriptError::Malformed("unexpected opcode")),
    }
}

fn expect_key(iter: &mut Instructions<'_>) -> Result<PublicKey, ScriptError> {
    match next_instruction(iter)? {
        Instruction::PushBytes(push) if push.len() == KEY_LEN => {
            Ok(PublicKey::from_slice(push.as_bytes())?)
        }
        Instruction::PushBytes(_) => Err(ScriptError::Malformed("public key push is not 33 bytes")),
        _ => Err(ScriptError::Malformed("expected public key push")),
    }
}

/// Parse the timelock operand: either an `OP_PUSHNUM` (1–16) or a
/// little-endian script-number push. Minimality is enforced by the caller's
/// re-encoding check, not here.
fn expect_timelock_value(iter: &mut Instructions<'_>) -> Result<u32, ScriptError> {
    match next_instruction(iter)? {
        Instruction::Op(op)
            if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&op.to_u8()) =>
        {
            Ok((op.to_u8() - OP_PUSHNUM_1.to_u8()) as u32 + 1)
        }
        Instruction::PushBytes(push) => {
            let bytes = push.as_bytes();
            if bytes.is_empty() || bytes.len() > 3 {
                return Err(ScriptError::Malformed("timelock push out of range"));
            }
            if bytes[bytes.len() - 1] & 0x80 != 0 {
                return Err(ScriptError::Malformed("negative timelock"));
            }
            let mut value: u32 = 0;
            for (i, byte) in bytes.iter().enumerate() {
                value |= (*byte as u32) << (8 * i);
            }
            Ok(value)
        }
        _ => Err(ScriptError::Malformed("expected timelock push")),
    }
}
