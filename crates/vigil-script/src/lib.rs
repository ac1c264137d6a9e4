//! Vigil script codecs
//!
//! Hand-assembled Bitcoin scripts for the Vigil escrow:
//!
//! - the two-branch timelock witness script (owner spends any time,
//!   recipient spends after a relative timelock), committed to by a P2WSH
//!   output
//! - the `OP_RETURN` recovery-payload output carried by a disclosure
//!   transaction
//!
//! Both formats are bit-exact wire formats: every script decoded here
//! re-encodes to the identical bytes, and pre-signed transactions depend on
//! that stability.

pub mod escrow;
pub mod payload;
pub mod timelock;

pub use escrow::{EscrowDescriptor, ScriptError};
pub use payload::{PayloadError, RecoveryPayload, PAYLOAD_LEN};
pub use timelock::{Timelock, TimelockError};
