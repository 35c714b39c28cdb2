//! At-rest encryption for stored page images.
//!
//! The archive format is deliberately simple: a key derived once from a
//! passphrase, and one AES-256-GCM blob per page, laid out as
//! `[12-byte nonce][ciphertext + 16-byte tag]`. Everything happens in memory,
//! which is fine for single scanned pages.
//!
//! The key is PBKDF2-HMAC-SHA1 over the passphrase with a fixed, empty salt,
//! so the same passphrase always produces the same key. This is a known
//! weakness of the archive format, kept so that archives written by earlier
//! versions of the indexer stay readable.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use thiserror::Error;
use zeroize::Zeroize;

/// PBKDF2 iterations. Part of the archive format: changing this makes
/// existing archives unreadable.
pub const PBKDF2_ITERATIONS: u32 = 4096;

/// The fixed salt used for key derivation.
const SALT: &[u8] = b"";

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// Errors encrypting or decrypting pages.
#[derive(Debug, Error)]
pub enum CryptError {
    #[error("passphrase cannot be empty")]
    EmptyPassphrase,

    #[error("encrypted data is too short ({0} bytes)")]
    TooShort(usize),

    #[error("encryption failed")]
    EncryptionFailed,

    /// Wrong passphrase, or the data was modified.
    #[error("decryption failed: wrong passphrase or corrupted data")]
    AuthenticationFailed,
}

/// Passphrase-derived key, zeroed on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
struct PageKey([u8; KEY_LENGTH]);

/// Encrypts and decrypts page blobs with a passphrase-derived key.
pub struct PageCrypt {
    key: PageKey,
}

impl PageCrypt {
    /// Derive a key from `passphrase`. This is deliberately slow-ish, so do it
    /// once per run.
    pub fn new(passphrase: &str) -> Result<Self, CryptError> {
        if passphrase.is_empty() {
            return Err(CryptError::EmptyPassphrase);
        }
        let mut key = PageKey([0u8; KEY_LENGTH]);
        pbkdf2_hmac::<Sha1>(passphrase.as_bytes(), SALT, PBKDF2_ITERATIONS, &mut key.0);
        Ok(Self { key })
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key.0))
    }

    /// Encrypt `plaintext` with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptError> {
        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a blob produced by [`PageCrypt::encrypt`].
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CryptError> {
        if blob.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptError::TooShort(blob.len()));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LENGTH);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptError::AuthenticationFailed)
    }
}

impl std::fmt::Debug for PageCrypt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCrypt").finish_non_exhaustive()
    }
}
