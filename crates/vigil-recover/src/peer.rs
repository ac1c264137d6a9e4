//! Public-key channel for escrowed-key delivery.
//!
//! The orchestrator treats public-key encryption as an opaque authenticated
//! channel between one fixed sender and one fixed recipient, and only ever
//! passes it a hex-encoded key. The trait keeps the orchestrator testable
//! and lets deployments swap the transport.

use nostr_sdk::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PeerCipherError {
    #[error("Peer encryption failed: {0}")]
    Encrypt(String),

    #[error("Peer decryption failed: {0}")]
    Decrypt(String),
}

/// An authenticated public-key channel between two fixed parties.
///
/// Implementations hold both endpoints' key material: the local secret key
/// and the remote public key. `encrypt` and `decrypt` are directionless —
/// the underlying conversation key is shared, so the recipient constructs
/// the same channel with their own secret key and the sender's public key.
pub trait PeerCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, PeerCipherError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, PeerCipherError>;
}

/// Production channel: NIP-44 v2 between our keys and a remote public key.
pub struct Nip44Cipher {
    keys: Keys,
    remote: PublicKey,
}

impl Nip44Cipher {
    pub fn new(keys: Keys, remote: PublicKey) -> Self {
        Self { keys, remote }
    }
}

impl PeerCipher for Nip44Cipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, PeerCipherError> {
        nip44::encrypt(
            self.keys.secret_key(),
            &self.remote,
            plaintext,
            nip44::Version::V2,
        )
        .map_err(|e| PeerCipherError::Encrypt(e.to_string()))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, PeerCipherError> {
        nip44::decrypt(self.keys.secret_key(), &self.remote, ciphertext)
            .map_err(|e| PeerCipherError::Decrypt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nip44_roundtrip_both_directions() {
        let sender = Keys::generate();
        let recipient = Keys::generate();

        let outbound = Nip44Cipher::new(sender.clone(), recipient.public_key());
        let inbound = Nip44Cipher::new(recipient, sender.public_key());

        let encrypted = outbound.encrypt("vigil key material").unwrap();
        assert_ne!(encrypted, "vigil key material");

        let decrypted = inbound.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted, "vigil key material");
    }

    #[test]
    fn test_wrong_recipient_cannot_decrypt() {
        let sender = Keys::generate();
        let recipient = Keys::generate();
        let eavesdropper = Keys::generate();

        let outbound = Nip44Cipher::new(sender.clone(), recipient.public_key());
        let encrypted = outbound.encrypt("vigil key material").unwrap();

        let wrong = Nip44Cipher::new(eavesdropper, sender.public_key());
        assert!(wrong.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let sender = Keys::generate();
        let recipient = Keys::generate();

        let outbound = Nip44Cipher::new(sender.clone(), recipient.public_key());
        let encrypted = outbound.encrypt("vigil key material").unwrap();

        // Flip a character in the base64 body
        let mut tampered: Vec<char> = encrypted.chars().collect();
        let mid = tampered.len() / 2;
        tampered[mid] = if tampered[mid] == 'A' { 'B' } else { 'A' };
        let tampered: String = tampered.into_iter().collect();

        let inbound = Nip44Cipher::new(recipient, sender.public_key());
        assert!(inbound.decrypt(&tampered).is_err());
    }
}
