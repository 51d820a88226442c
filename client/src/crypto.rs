//! Passphrase-based encryption of secret payloads.
//!
//! Every encryption derives a fresh key with PBKDF2-HMAC-SHA256 over a random
//! 8-byte salt and seals the payload with AES-256-GCM under a random 12-byte
//! nonce. The stored bytes are `salt ‖ nonce ‖ ciphertext‖tag`, stamped with
//! the SHA-256 of the whole buffer. The random salt and nonce make the output
//! different on every call even for identical plaintext, so a re-encryption is
//! always observable as a new hash; the sync state machine relies on this.
//!
//! The byte layout is fixed: every client must be able to decrypt every other
//! client's output with nothing but the shared passphrase.

use {
    crate::error::{Error, Result},
    aes_gcm::{
        aead::{Aead, OsRng},
        Aes256Gcm, KeyInit, Nonce,
    },
    hoard_protocol::SecretHash,
    pbkdf2::pbkdf2_hmac,
    rand::RngCore,
    sha2::Sha256,
};

const SALT_LEN: usize = 8;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const PBKDF2_ROUNDS: u32 = 1024 * 1024;

/// An encrypted payload together with the hash that identifies this exact
/// ciphertext. The default value (empty bytes, zero hash) is the tombstone
/// payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CipherBlob {
    pub bytes: Vec<u8>,
    pub hash: SecretHash,
}

impl CipherBlob {
    /// Wraps freshly produced ciphertext, stamping it with its hash.
    pub fn new(bytes: Vec<u8>) -> Self {
        let hash = SecretHash::digest(&bytes);
        Self { bytes, hash }
    }

    /// Reassembles a blob received from elsewhere, trusting the supplied hash.
    pub fn from_parts(bytes: Vec<u8>, hash: SecretHash) -> Self {
        Self { bytes, hash }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn derive_key(passphrase: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    key
}

/// Encrypts a plaintext payload under the passphrase.
pub fn encrypt(plaintext: &[u8], passphrase: &str) -> Result<CipherBlob> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new(&derive_key(passphrase, &salt).into());
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| anyhow::anyhow!("encryption failed"))?;

    let mut bytes = Vec::with_capacity(SALT_LEN + NONCE_LEN + sealed.len());
    bytes.extend_from_slice(&salt);
    bytes.extend_from_slice(&nonce);
    bytes.extend_from_slice(&sealed);

    Ok(CipherBlob::new(bytes))
}

/// Decrypts a blob, verifying the integrity hash before attempting AEAD.
///
/// A hash mismatch reports corruption; an AEAD failure reports a bad
/// passphrase (or ciphertext tampered with in a way the hash cannot see,
/// since the hash travels alongside the bytes).
pub fn decrypt(blob: &CipherBlob, passphrase: &str) -> Result<Vec<u8>> {
    if SecretHash::digest(&blob.bytes) != blob.hash {
        return Err(Error::Corruption);
    }

    if blob.bytes.len() < SALT_LEN + NONCE_LEN {
        return Err(Error::Corruption);
    }
    let (salt, rest) = blob.bytes.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new(&derive_key(passphrase, salt).into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::BadPassphrase)
}
