//! Key escrow and recovery.
//!
//! Encryption side: generate K, seal the secret under it, then derive the
//! three escrow artifacts (peer ciphertext, passphrase bundle, plaintext K
//! for the on-chain payload). Recovery side: three independent functions,
//! one per channel, each returning the identical 32 bytes.
//!
//! # Security Notes
//!
//! - Argon2id is memory-hard (resistant to GPU/ASIC attacks)
//! - AES-256-GCM provides authenticated encryption
//! - Every encryption uses a fresh random nonce; every passphrase wrap a
//!   fresh random salt
//! - Authentication failures surface as [`RecoverError::DecryptionFailed`]
//!   with no partial plaintext, and are reported distinctly from
//!   missing-data errors so a UI can tell "wrong key" from "no data"

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::peer::{PeerCipher, PeerCipherError};
use vigil_script::{PayloadError, RecoveryPayload};

/// Argon2id parameters (OWASP recommendations for 2024+)
/// - m_cost: 64 MiB memory
/// - t_cost: 3 iterations
/// - p_cost: 4 parallel threads
const ARGON2_M_COST: u32 = 65536; // 64 MiB
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 4;

/// Symmetric key length (AES-256)
const KEY_LEN: usize = 32;

/// Salt length for Argon2
const SALT_LEN: usize = 16;

/// Nonce length for AES-256-GCM
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum RecoverError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: wrong key/passphrase or corrupted data")]
    DecryptionFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Recovered key has invalid length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Recovered key is not valid hex")]
    InvalidKeyEncoding,

    #[error("Invalid bundle format")]
    InvalidFormat,

    #[error("Invalid payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("Peer channel error: {0}")]
    Peer(#[from] PeerCipherError),
}

/// The 32-byte symmetric key K. Generated once per secret, never reused.
///
/// Zeroized on drop; `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    /// Generate a fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecoverError> {
        if bytes.len() != KEY_LEN {
            return Err(RecoverError::InvalidKeyLength(bytes.len()));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, RecoverError> {
        let bytes = hex::decode(s.trim()).map_err(|_| RecoverError::InvalidKeyEncoding)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey(<redacted>)")
    }
}

/// The owner's secret, sealed under K.
///
/// Wire form: nonce || ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSecret {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

impl SealedSecret {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecoverError> {
        // Minimum: nonce + 16-byte tag
        if bytes.len() < NONCE_LEN + 16 {
            return Err(RecoverError::InvalidFormat);
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);
        Ok(Self {
            ciphertext: bytes[NONCE_LEN..].to_vec(),
            nonce,
        })
    }
}

/// K wrapped under a passphrase-derived key.
///
/// Wire form: salt || nonce || ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassphraseBundle {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub salt: [u8; SALT_LEN],
}

impl PassphraseBundle {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SALT_LEN + NONCE_LEN + self.ciphertext.len());
        bytes.extend_from_slice(&self.salt);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecoverError> {
        if bytes.len() < SALT_LEN + NONCE_LEN + 16 {
            return Err(RecoverError::InvalidFormat);
        }
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        salt.copy_from_slice(&bytes[..SALT_LEN]);
        nonce.copy_from_slice(&bytes[SALT_LEN..SALT_LEN + NONCE_LEN]);
        Ok(Self {
            ciphertext: bytes[SALT_LEN + NONCE_LEN..].to_vec(),
            nonce,
            salt,
        })
    }
}

/// Everything produced at escrow time for one secret.
pub struct KeyEscrow {
    /// K in the clear, for embedding in the disclosure payload.
    pub key: SymmetricKey,
    /// The secret sealed under K.
    pub sealed_secret: SealedSecret,
    /// hex(K) encrypted over the public-key channel.
    pub peer_ciphertext: String,
    /// K wrapped under the passphrase, when one was supplied.
    pub passphrase_bundle: Option<PassphraseBundle>,
}

/// Derive an AES key from a passphrase with Argon2id.
fn derive_passphrase_key(
    passphrase: &str,
    salt: &[u8; SALT_LEN],
) -> Result<[u8; KEY_LEN], RecoverError> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(KEY_LEN))
        .map_err(|e| RecoverError::KeyDerivationFailed(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| RecoverError::KeyDerivationFailed(e.to_string()))?;
    Ok(key)
}

fn random_nonce() -> [u8; NONCE_LEN] {
    let generated = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&generated);
    nonce
}

/// Seal a plaintext secret under K with a fresh nonce.
pub fn seal_secret(plaintext: &[u8], key: &SymmetricKey) -> Result<SealedSecret, RecoverError> {
    let nonce = random_nonce();
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| RecoverError::EncryptionFailed(e.to_string()))?;
    Ok(SealedSecret { ciphertext, nonce })
}

/// Open a sealed secret with K.
pub fn open_secret(sealed: &SealedSecret, key: &SymmetricKey) -> Result<Vec<u8>, RecoverError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            Nonce::from_slice(&sealed.nonce),
            sealed.ciphertext.as_slice(),
        )
        .map_err(|_| RecoverError::DecryptionFailed)
}

/// Wrap K under a passphrase: fresh salt, Argon2id, AES-256-GCM.
pub fn wrap_key_with_passphrase(
    key: &SymmetricKey,
    passphrase: &str,
) -> Result<PassphraseBundle, RecoverError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let nonce = random_nonce();

    let mut derived = derive_passphrase_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&derived));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), key.as_bytes().as_slice())
        .map_err(|e| RecoverError::EncryptionFailed(e.to_string()))?;
    derived.zeroize();

    Ok(PassphraseBundle {
        ciphertext,
        nonce,
        salt,
    })
}

/// Unwrap K with the passphrase used at wrap time.
pub fn unwrap_key_with_passphrase(
    bundle: &PassphraseBundle,
    passphrase: &str,
) -> Result<SymmetricKey, RecoverError> {
    let mut derived = derive_passphrase_key(passphrase, &bundle.salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&derived));
    let result = cipher.decrypt(
        Nonce::from_slice(&bundle.nonce),
        bundle.ciphertext.as_slice(),
    );
    derived.zeroize();

    let mut plaintext = result.map_err(|_| RecoverError::DecryptionFailed)?;
    let key = SymmetricKey::from_bytes(&plaintext);
    plaintext.zeroize();
    key
}

/// Escrow-time orchestration: generate K, seal the secret, derive the
/// channel artifacts.
///
/// K is returned in the clear inside [`KeyEscrow`] so the caller can embed
/// it in the disclosure transaction's payload.
pub fn escrow_secret(
    secret: &[u8],
    peer: &dyn PeerCipher,
    passphrase: Option<&str>,
) -> Result<KeyEscrow, RecoverError> {
    let key = SymmetricKey::generate();
    let sealed_secret = seal_secret(secret, &key)?;
    let peer_ciphertext = peer.encrypt(&key.to_hex())?;
    let passphrase_bundle = passphrase
        .map(|passphrase| wrap_key_with_passphrase(&key, passphrase))
        .transpose()?;

    Ok(KeyEscrow {
        key,
        sealed_secret,
        peer_ciphertext,
        passphrase_bundle,
    })
}

/// Recover K from an on-chain payload. The payload carries K in the clear;
/// this path has no ciphertext to fail on.
pub fn recover_key_from_payload(payload: &RecoveryPayload) -> SymmetricKey {
    SymmetricKey(payload.key)
}

/// Recover K from the passphrase channel.
pub fn recover_key_with_passphrase(
    bundle: &PassphraseBundle,
    passphrase: &str,
) -> Result<SymmetricKey, RecoverError> {
    unwrap_key_with_passphrase(bundle, passphrase)
}

/// Recover K from the public-key channel.
pub fn recover_key_via_peer(
    peer: &dyn PeerCipher,
    ciphertext: &str,
) -> Result<SymmetricKey, RecoverError> {
    let key_hex = peer.decrypt(ciphertext)?;
    SymmetricKey::from_hex(&key_hex)
}

/// One recovery channel's input, validated at construction.
#[derive(Debug, Clone)]
pub enum RecoverySource {
    /// Raw 64-byte payload pulled from a broadcast disclosure transaction.
    Payload(RecoveryPayload),
    /// Passphrase-wrapped bundle plus the passphrase.
    Passphrase {
        bundle: PassphraseBundle,
        passphrase: String,
    },
    /// Ciphertext from the public-key channel.
    Peer { ciphertext: String },
}

impl RecoverySource {
    /// Build the payload variant from raw bytes, enforcing the 64-byte
    /// invariant up front.
    pub fn payload(bytes: &[u8]) -> Result<Self, RecoverError> {
        Ok(Self::Payload(RecoveryPayload::from_bytes(bytes)?))
    }

    /// Build the passphrase variant from the bundle's wire form.
    pub fn passphrase(bundle_bytes: &[u8], passphrase: impl Into<String>) -> Result<Self, RecoverError> {
        Ok(Self::Passphrase {
            bundle: PassphraseBundle::from_bytes(bundle_bytes)?,
            passphrase: passphrase.into(),
        })
    }

    pub fn peer(ciphertext: impl Into<String>) -> Self {
        Self::Peer {
            ciphertext: ciphertext.into(),
        }
    }

    /// Recover K from this channel. `peer` is consulted only by the
    /// public-key variant.
    pub fn recover(&self, peer: &dyn PeerCipher) -> Result<SymmetricKey, RecoverError> {
        match self {
            Self::Payload(payload) => Ok(recover_key_from_payload(payload)),
            Self::Passphrase { bundle, passphrase } => {
                recover_key_with_passphrase(bundle, passphrase)
            }
            Self::Peer { ciphertext } => recover_key_via_peer(peer, ciphertext),
        }
    }
}
