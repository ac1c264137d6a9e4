//! Recovery payload carried by a disclosure transaction.
//!
//! The payload rides in a zero-value, unspendable output whose script is
//! `OP_RETURN <64-byte push>`: the 32-byte symmetric key followed by a
//! 32-byte event correlation id. The length is fixed; anything other than
//! exactly 64 bytes is malformed, not a different payload kind.

use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::script::{Builder, Instruction, Script, ScriptBuf};
use std::fmt;
use thiserror::Error;

/// Symmetric key length within the payload
const KEY_LEN: usize = 32;

/// Event correlation id length within the payload
const EVENT_ID_LEN: usize = 32;

/// Total payload length: key || event id
pub const PAYLOAD_LEN: usize = KEY_LEN + EVENT_ID_LEN;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Payload must be exactly {PAYLOAD_LEN} bytes, got {0}")]
    Length(usize),

    #[error("Script is not an OP_RETURN payload output")]
    NotPayloadScript,
}

/// The 64-byte value disclosed on-chain: symmetric key plus an opaque
/// correlation id for the out-of-band channel.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPayload {
    pub key: [u8; KEY_LEN],
    pub event_id: [u8; EVENT_ID_LEN],
}

impl RecoveryPayload {
    pub fn new(key: [u8; KEY_LEN], event_id: [u8; EVENT_ID_LEN]) -> Self {
        Self { key, event_id }
    }

    /// Concatenated wire form: key || event id.
    pub fn to_bytes(&self) -> [u8; PAYLOAD_LEN] {
        let mut bytes = [0u8; PAYLOAD_LEN];
        bytes[..KEY_LEN].copy_from_slice(&self.key);
        bytes[KEY_LEN..].copy_from_slice(&self.event_id);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PayloadError> {
        if bytes.len() != PAYLOAD_LEN {
            return Err(PayloadError::Length(bytes.len()));
        }
        let mut key = [0u8; KEY_LEN];
        let mut event_id = [0u8; EVENT_ID_LEN];
        key.copy_from_slice(&bytes[..KEY_LEN]);
        event_id.copy_from_slice(&bytes[KEY_LEN..]);
        Ok(Self { key, event_id })
    }

    /// The unspendable output script carrying this payload.
    pub fn to_script(&self) -> ScriptBuf {
        Builder::new()
            .push_opcode(OP_RETURN)
            .push_slice(self.to_bytes())
            .into_script()
    }

    /// Parse a payload back out of an output script.
    ///
    /// Accepts both the direct length-prefixed push and `OP_PUSHDATA1` (the
    /// extended form used for pushes over 75 bytes), since other writers of
    /// this format may not push minimally. The push must still be exactly 64
    /// bytes.
    pub fn from_script(script: &Script) -> Result<Self, PayloadError> {
        let mut instructions = script.instructions();

        match instructions.next() {
            Some(Ok(Instruction::Op(op))) if op == OP_RETURN => {}
            _ => return Err(PayloadError::NotPayloadScript),
        }
        let payload = match instructions.next() {
            Some(Ok(Instruction::PushBytes(push))) => Self::from_bytes(push.as_bytes())?,
            _ => return Err(PayloadError::NotPayloadScript),
        };
        if instructions.next().is_some() {
            return Err(PayloadError::NotPayloadScript);
        }
        Ok(payload)
    }
}

// The key half is secret until disclosure time; keep it out of Debug output.
impl fmt::Debug for RecoveryPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryPayload")
            .field("key", &"<redacted>")
            .field("event_id", &hex::encode(self.event_id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_roundtrip() {
        let payload = RecoveryPayload::new([0xAA; 32], [0xBB; 32]);
        let bytes = payload.to_bytes();
        assert_eq!(bytes.len(), 64);
        assert_eq!(&bytes[..32], &[0xAA; 32]);
        assert_eq!(&bytes[32..], &[0xBB; 32]);

        let restored = RecoveryPayload::from_bytes(&bytes).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        assert!(matches!(
            RecoveryPayload::from_bytes(&[0u8; 32]),
            Err(PayloadError::Length(32))
        ));
        assert!(matches!(
            RecoveryPayload::from_bytes(&[0u8; 65]),
            Err(PayloadError::Length(65))
        ));
        assert!(matches!(
            RecoveryPayload::from_bytes(&[]),
            Err(PayloadError::Length(0))
        ));
    }

    #[test]
    fn test_script_roundtrip() {
        let payload = RecoveryPayload::new([0x11; 32], [0x22; 32]);
        let script = payload.to_script();

        assert!(script.is_op_return());
        // OP_RETURN + length prefix + 64 bytes of data
        assert_eq!(script.len(), 66);

        let restored = RecoveryPayload::from_script(&script).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn test_from_script_accepts_pushdata1() {
        let payload = RecoveryPayload::new([0x33; 32], [0x44; 32]);
        // OP_RETURN OP_PUSHDATA1 0x40 <64 bytes>
        let mut bytes = vec![OP_RETURN.to_u8(), 0x4c, 0x40];
        bytes.extend_from_slice(&payload.to_bytes());
        let script = ScriptBuf::from_bytes(bytes);

        let restored = RecoveryPayload::from_script(&script).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn test_from_script_rejects_wrong_push_length() {
        let script = Builder::new()
            .push_opcode(OP_RETURN)
            .push_slice([0x55u8; 32])
            .into_script();
        assert!(matches!(
            RecoveryPayload::from_script(&script),
            Err(PayloadError::Length(32))
        ));
    }

    #[test]
    fn test_from_script_rejects_non_op_return() {
        let script = Builder::new().push_slice([0x55u8; 64]).into_script();
        assert!(matches!(
            RecoveryPayload::from_script(&script),
            Err(PayloadError::NotPayloadScript)
        ));

        let empty = ScriptBuf::new();
        assert!(RecoveryPayload::from_script(&empty).is_err());
    }

    #[test]
    fn test_from_script_rejects_trailing_push() {
        let payload = RecoveryPayload::new([0x66; 32], [0x77; 32]);
        let script = Builder::new()
            .push_opcode(OP_RETURN)
            .push_slice(payload.to_bytes())
            .push_slice([0x01u8])
            .into_script();
        assert!(matches!(
            RecoveryPayload::from_script(&script),
            Err(PayloadError::NotPayloadScript)
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let payload = RecoveryPayload::new([0xAA; 32], [0xBB; 32]);
        let debug = format!("{:?}", payload);
        assert!(!debug.contains("aaaaaa"), "debug output leaked key: {}", debug);
        assert!(debug.contains("<redacted>"));
    }
}
