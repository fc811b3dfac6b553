//! Envelope error types.

use sealpack_crypto::CryptoError;
use thiserror::Error;

/// Result type for envelope operations.
pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

/// Errors that can occur while building or processing an envelope.
///
/// `UnwrapFailed` deliberately does not distinguish a wrong credential from a
/// corrupted wrap entry, so failed decryption attempts cannot be used as an
/// oracle. `RecipientNotFound` is reported separately because the recipient id
/// is public metadata.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("operation out of sequence: {0}")]
    InvalidState(&'static str),

    #[error("recipient id already registered")]
    DuplicateRecipient,

    #[error("chunk exceeds negotiated size: expected at most {expected} bytes, got {actual}")]
    ChunkSizeMismatch { expected: usize, actual: usize },

    #[error("malformed content info: {0}")]
    MalformedContentInfo(&'static str),

    #[error("no recipient entry matches the given id")]
    RecipientNotFound,

    #[error("content key unwrap failed (wrong credential or corrupted entry)")]
    UnwrapFailed,

    #[error("chunk authentication failed (ciphertext tampered, reordered, or wrong key)")]
    AuthenticationFailed,

    #[error("crypto primitive failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
