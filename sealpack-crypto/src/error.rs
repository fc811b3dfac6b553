//! Crypto primitive error types.

use thiserror::Error;

/// Result type for primitive crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in primitive crypto operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}
