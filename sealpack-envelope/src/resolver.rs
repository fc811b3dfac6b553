//! One-shot envelope round trips over in-memory buffers.
//!
//! Production callers almost always perform the full sequence — set content
//! info, start, drive chunks, finish — so these helpers do exactly that and
//! nothing more. All failure kinds surface unchanged from the chunk layer.

use crate::chunk::ChunkCryptor;
use crate::content_info::ContentInfo;
use crate::error::EnvelopeResult;
use crate::recipient::RecipientRegistry;
use sealpack_crypto::{KdfParams, SecretKey, TAG_SIZE};

/// Output of a one-shot encryption: the detached content info and the
/// ciphertext, separately addressable.
pub struct EncryptedEnvelope {
    pub content_info: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Collapses into the embedded layout: length-prefixed content info
    /// followed by the ciphertext.
    pub fn into_embedded(self) -> EnvelopeResult<Vec<u8>> {
        let info = ContentInfo::decode(&self.content_info)?;
        let mut out = info.encode_embedded();
        out.extend_from_slice(&self.ciphertext);
        Ok(out)
    }
}

/// Encrypts a whole buffer for the recipients in `registry`.
///
/// `preferred_chunk_size` is negotiated exactly as in
/// [`ChunkCryptor::start_encryption`]; pass 0 for the default.
pub fn encrypt(
    plaintext: &[u8],
    registry: RecipientRegistry,
    preferred_chunk_size: usize,
    kdf_params: KdfParams,
) -> EnvelopeResult<EncryptedEnvelope> {
    let mut cryptor = ChunkCryptor::from_registry_with_kdf_params(registry, kdf_params);
    let chunk_size = cryptor.start_encryption(preferred_chunk_size)?;

    let mut ciphertext = Vec::with_capacity(plaintext.len() + TAG_SIZE);
    for chunk in plaintext.chunks(chunk_size) {
        ciphertext.extend_from_slice(&cryptor.process_data_chunk(chunk)?);
    }
    cryptor.finish()?;

    Ok(EncryptedEnvelope {
        content_info: cryptor.content_info()?,
        ciphertext,
    })
}

/// Decrypts a whole buffer as a key recipient from a detached content info.
pub fn decrypt_with_key(
    content_info: &[u8],
    ciphertext: &[u8],
    recipient_id: &[u8],
    secret_key: &SecretKey,
) -> EnvelopeResult<Vec<u8>> {
    let mut cryptor = ChunkCryptor::new();
    cryptor.set_content_info(content_info)?;
    let stride = cryptor.start_decryption(recipient_id, secret_key)?;
    drive(cryptor, ciphertext, stride)
}

/// Decrypts a whole buffer as a password recipient from a detached content
/// info.
pub fn decrypt_with_password(
    content_info: &[u8],
    ciphertext: &[u8],
    password: &str,
) -> EnvelopeResult<Vec<u8>> {
    let mut cryptor = ChunkCryptor::new();
    cryptor.set_content_info(content_info)?;
    let stride = cryptor.start_decryption_with_password(password)?;
    drive(cryptor, ciphertext, stride)
}

/// Decrypts an embedded payload (content info prefixed to the ciphertext) as
/// a key recipient.
pub fn decrypt_embedded_with_key(
    payload: &[u8],
    recipient_id: &[u8],
    secret_key: &SecretKey,
) -> EnvelopeResult<Vec<u8>> {
    let (info, ciphertext) = ContentInfo::split_embedded(payload)?;
    decrypt_with_key(&info.encode(), ciphertext, recipient_id, secret_key)
}

/// Decrypts an embedded payload as a password recipient.
pub fn decrypt_embedded_with_password(payload: &[u8], password: &str) -> EnvelopeResult<Vec<u8>> {
    let (info, ciphertext) = ContentInfo::split_embedded(payload)?;
    decrypt_with_password(&info.encode(), ciphertext, password)
}

fn drive(
    mut cryptor: ChunkCryptor,
    ciphertext: &[u8],
    stride: usize,
) -> EnvelopeResult<Vec<u8>> {
    let mut plaintext = Vec::with_capacity(ciphertext.len());
    for chunk in ciphertext.chunks(stride) {
        plaintext.extend_from_slice(&cryptor.process_data_chunk(chunk)?);
    }
    cryptor.finish()?;
    Ok(plaintext)
}
