//! Multi-path recovery of the escrowed symmetric key.
//!
//! One 32-byte key K encrypts the owner's secret. K itself is escrowed over
//! three independent, failure-isolated channels:
//!
//! 1. **Public-key channel** — hex(K) encrypted sender→recipient over an
//!    authenticated public-key channel (NIP-44 in production). Convenient,
//!    but a stored ciphertext is not safe against a sufficiently powerful
//!    future adversary.
//! 2. **Passphrase channel** — K wrapped under an Argon2id-derived key.
//!    Safe as long as the passphrase is strong and remembered.
//! 3. **On-chain payload** — K in the clear inside the disclosure
//!    transaction's OP_RETURN output, protected until disclosure time by
//!    the escrow timelock alone. The only channel immune to cryptanalysis
//!    of a stored ciphertext, classical or quantum.
//!
//! Each channel recovers the identical 32 bytes on its own; a failure in
//! one never blocks trying another.

pub mod extract;
pub mod orchestrator;
pub mod peer;

pub use extract::{decode_transaction, extract_payload, find_payload, ExtractError};
pub use orchestrator::{
    escrow_secret, open_secret, recover_key_from_payload, recover_key_via_peer,
    recover_key_with_passphrase, seal_secret, unwrap_key_with_passphrase,
    wrap_key_with_passphrase, KeyEscrow, PassphraseBundle, RecoverError, RecoverySource,
    SealedSecret, SymmetricKey,
};
pub use peer::{Nip44Cipher, PeerCipher, PeerCipherError};
