//! Asymmetric key wrapping via anonymous X25519 sealing.
//!
//! Uses ephemeral X25519 key exchange + XSalsa20-Poly1305 for wrapping key
//! material under a recipient's public key. A fresh ephemeral keypair is
//! generated per seal, so the sender's identity is never revealed and two
//! seals of the same payload are unlinkable.

use crate::error::{CryptoError, CryptoResult};
use crypto_box::aead::Aead;
use crypto_box::SalsaBox;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

pub use crypto_box::{PublicKey, SecretKey};

/// Size of an X25519 public or secret key in bytes.
pub const ASYM_KEY_SIZE: usize = 32;

/// Size of an XSalsa20 nonce in bytes.
pub const SEAL_NONCE_SIZE: usize = 24;

/// X25519 keypair for key-based envelope recipients.
///
/// The secret key implements `ZeroizeOnDrop` automatically (from crypto_box).
pub struct KeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl KeyPair {
    /// Generates a fresh X25519 keypair from the OS RNG.
    pub fn generate() -> Self {
        let secret = SecretKey::generate(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Returns the public key as raw 32-byte array.
    pub fn public_bytes(&self) -> [u8; ASYM_KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// Returns the secret key as raw 32-byte array.
    pub fn secret_bytes(&self) -> [u8; ASYM_KEY_SIZE] {
        self.secret.to_bytes()
    }

    /// Reconstructs a keypair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: [u8; ASYM_KEY_SIZE]) -> Self {
        let secret = SecretKey::from(bytes);
        let public = secret.public_key();
        Self { secret, public }
    }
}

/// Key material sealed with a recipient's X25519 public key.
///
/// The ephemeral public key is included so the recipient can reconstruct the
/// shared secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKey {
    /// Ephemeral X25519 public key (sender side of DH).
    pub ephemeral_public_key: [u8; ASYM_KEY_SIZE],
    /// XSalsa20 nonce (24 bytes).
    pub nonce: [u8; SEAL_NONCE_SIZE],
    /// Encrypted key material (XSalsa20-Poly1305 ciphertext + tag).
    pub ciphertext: Vec<u8>,
}

impl SealedKey {
    /// Serializes to `ephemeral_public_key || nonce || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(ASYM_KEY_SIZE + SEAL_NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.ephemeral_public_key);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parses the layout produced by [`to_bytes`].
    ///
    /// [`to_bytes`]: SealedKey::to_bytes
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < ASYM_KEY_SIZE + SEAL_NONCE_SIZE {
            return Err(CryptoError::Decryption("sealed key too short".to_string()));
        }
        let mut ephemeral_public_key = [0u8; ASYM_KEY_SIZE];
        ephemeral_public_key.copy_from_slice(&bytes[..ASYM_KEY_SIZE]);
        let mut nonce = [0u8; SEAL_NONCE_SIZE];
        nonce.copy_from_slice(&bytes[ASYM_KEY_SIZE..ASYM_KEY_SIZE + SEAL_NONCE_SIZE]);
        Ok(Self {
            ephemeral_public_key,
            nonce,
            ciphertext: bytes[ASYM_KEY_SIZE + SEAL_NONCE_SIZE..].to_vec(),
        })
    }
}

/// Seals key material for a recipient using anonymous envelope encryption.
///
/// An ephemeral X25519 keypair is generated for each seal operation.
pub fn seal(plaintext: &[u8], recipient_pk: &PublicKey) -> CryptoResult<SealedKey> {
    let ephemeral = SecretKey::generate(&mut OsRng);
    let ephemeral_pk = ephemeral.public_key();

    let salsa_box = SalsaBox::new(recipient_pk, &ephemeral);

    let mut nonce_bytes = [0u8; SEAL_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = salsa_box
        .encrypt(crypto_box::Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CryptoError::Encryption(format!("seal failed: {e}")))?;

    Ok(SealedKey {
        ephemeral_public_key: *ephemeral_pk.as_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Opens sealed key material using the recipient's secret key.
pub fn open(sealed: &SealedKey, recipient_sk: &SecretKey) -> CryptoResult<Vec<u8>> {
    let ephemeral_pk = PublicKey::from(sealed.ephemeral_public_key);
    let salsa_box = SalsaBox::new(&ephemeral_pk, recipient_sk);

    salsa_box
        .decrypt(
            crypto_box::Nonce::from_slice(&sealed.nonce),
            sealed.ciphertext.as_ref(),
        )
        .map_err(|_| CryptoError::Decryption("wrong key or tampered data".to_string()))
}
