//! Authenticated symmetric encryption with ChaCha20-Poly1305.
//!
//! Two surfaces are exposed:
//!
//! - `encrypt_detached`/`decrypt_detached`: one-shot encryption under a fresh
//!   random nonce, used to wrap content keys for password recipients.
//! - `encrypt_chunk`/`decrypt_chunk`: position-bound encryption for bulk
//!   payload chunks. The per-chunk nonce is derived from the session nonce and
//!   the chunk counter, and the counter plus a final-chunk flag are bound into
//!   the AAD, so a reordered, replayed, or truncated chunk fails
//!   authentication instead of decrypting at the wrong position.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{SymmetricKey, random_bytes};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::{Deserialize, Serialize};

/// Size of a ChaCha20-Poly1305 nonce in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Size of a Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A one-shot ciphertext with its nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext followed by the Poly1305 tag.
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Serializes to `nonce || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parses the `nonce || ciphertext` layout produced by [`to_bytes`].
    ///
    /// [`to_bytes`]: EncryptedData::to_bytes
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption(
                "encrypted data too short".to_string(),
            ));
        }
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[..NONCE_SIZE]);
        Ok(Self {
            nonce,
            ciphertext: bytes[NONCE_SIZE..].to_vec(),
        })
    }
}

/// Encrypts a payload under a fresh random nonce.
pub fn encrypt_detached(key: &SymmetricKey, plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_SIZE];
    random_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedData { nonce, ciphertext })
}

/// Decrypts a one-shot payload.
pub fn decrypt_detached(key: &SymmetricKey, data: &EncryptedData) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(&data.nonce), data.ciphertext.as_ref())
        .map_err(|_| CryptoError::Decryption("wrong key or tampered data".to_string()))
}

/// Derives the nonce for a chunk by XORing the big-endian chunk counter
/// into the trailing eight bytes of the session nonce.
fn chunk_nonce(session_nonce: &[u8; NONCE_SIZE], chunk_index: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = *session_nonce;
    let counter = chunk_index.to_be_bytes();
    for (n, c) in nonce[NONCE_SIZE - 8..].iter_mut().zip(counter) {
        *n ^= c;
    }
    nonce
}

/// AAD binding a chunk to its position and end-of-stream role.
fn chunk_aad(chunk_index: u64, final_chunk: bool) -> [u8; 9] {
    let mut aad = [0u8; 9];
    aad[..8].copy_from_slice(&chunk_index.to_be_bytes());
    aad[8] = final_chunk as u8;
    aad
}

/// Encrypts one payload chunk bound to its position in the stream.
pub fn encrypt_chunk(
    key: &SymmetricKey,
    session_nonce: &[u8; NONCE_SIZE],
    chunk_index: u64,
    final_chunk: bool,
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let nonce = chunk_nonce(session_nonce, chunk_index);
    let aad = chunk_aad(chunk_index, final_chunk);

    cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// Decrypts one payload chunk, verifying its position binding.
pub fn decrypt_chunk(
    key: &SymmetricKey,
    session_nonce: &[u8; NONCE_SIZE],
    chunk_index: u64,
    final_chunk: bool,
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let nonce = chunk_nonce(session_nonce, chunk_index);
    let aad = chunk_aad(chunk_index, final_chunk);

    cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::Decryption("wrong key or tampered data".to_string()))
}
