//! Cryptographic primitives for sealpack.
//!
//! Provides the narrow primitive surface the envelope layer orchestrates:
//! - ChaCha20-Poly1305 for authenticated bulk and wrap encryption
//! - X25519 anonymous sealing (crypto_box) for key-based recipients
//! - Argon2id for password-based key derivation
//! - OS randomness and zeroized key newtypes
//!
//! This crate knows nothing about envelopes, recipients, or chunk sequencing;
//! it only encrypts, decrypts, seals, opens, and derives.

pub mod cipher;
pub mod error;
pub mod key;
pub mod seal;

pub use cipher::{
    EncryptedData, NONCE_SIZE, TAG_SIZE, decrypt_chunk, decrypt_detached, encrypt_chunk,
    encrypt_detached,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{
    KEY_SIZE, KdfParams, SALT_SIZE, Salt, SymmetricKey, derive_key, generate_random_key,
    random_bytes,
};
pub use seal::{
    ASYM_KEY_SIZE, KeyPair, PublicKey, SEAL_NONCE_SIZE, SealedKey, SecretKey, open, seal,
};
