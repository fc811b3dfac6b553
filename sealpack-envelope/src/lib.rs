//! Multi-recipient envelope encryption for sealpack.
//!
//! Data of arbitrary size is encrypted once under a random content-encryption
//! key (CEK), and the CEK is independently wrapped for each recipient: sealed
//! under X25519 public keys for key-based recipients, or encrypted under
//! Argon2id-derived keys for password recipients. The wrapped keys and
//! algorithm metadata travel in a compact binary content info that any
//! authorized recipient feeds back in to recover the CEK and decrypt.
//!
//! # Architecture
//!
//! - [`RecipientRegistry`]: recipients registered before encryption starts;
//!   consumed exactly once to wrap the CEK.
//! - [`ContentInfo`]: the serializable envelope metadata and its fixed-width
//!   binary codec, usable embedded in the ciphertext stream or detached.
//! - [`ChunkCryptor`]: bounded, caller-driven state machine processing
//!   fixed-size chunks with strict sequencing and position-bound
//!   authentication.
//! - [`StreamCryptor`]: one-pass reader-to-writer engine that chunks
//!   transparently and never buffers the whole payload.
//! - [`resolver`]: one-shot helpers for the common whole-buffer round trip.
//!
//! Compromising one recipient's wrapping never exposes another's: every wrap
//! is an independent encryption of the same CEK under unrelated key material.

pub mod chunk;
pub mod content_info;
pub mod error;
pub mod recipient;
pub mod resolver;
pub mod stream;

pub use chunk::{ChunkCryptor, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use content_info::{
    CipherAlgorithm, ContentInfo, FORMAT_VERSION, KeyRecipientEntry, PasswordRecipientEntry,
};
pub use error::{EnvelopeError, EnvelopeResult};
pub use recipient::RecipientRegistry;
pub use resolver::EncryptedEnvelope;
pub use stream::StreamCryptor;

// Re-exported so envelope callers can mint keypairs and pass credentials
// without depending on the primitive crate directly.
pub use sealpack_crypto::{KdfParams, KeyPair, PublicKey, SecretKey};
