//! Bounded chunk-by-chunk envelope encryption and decryption.
//!
//! A `ChunkCryptor` is a caller-driven state machine:
//!
//! ```text
//! Uninitialized --start_encryption--> Encrypting --finish--> Finished
//! Uninitialized --start_decryption--> Decrypting --finish--> Finished
//! ```
//!
//! Recipient registration is only possible before a session starts, and both
//! `start_*` transitions are only available from `Uninitialized`. Every chunk
//! is encrypted bound to its position, so reordering or splicing chunks fails
//! authentication on the decrypting side. A failed authentication poisons the
//! session: no further processing calls succeed.
//!
//! One instance drives one sequential session and is not meant to be shared
//! across threads; parallel streams need independent instances with
//! independent content keys.

use crate::content_info::{CipherAlgorithm, ContentInfo, FORMAT_VERSION};
use crate::error::{EnvelopeError, EnvelopeResult};
use crate::recipient::RecipientRegistry;
use sealpack_crypto::{
    EncryptedData, KEY_SIZE, KdfParams, NONCE_SIZE, PublicKey, SealedKey, SecretKey, SymmetricKey,
    TAG_SIZE, decrypt_chunk, decrypt_detached, derive_key, encrypt_chunk, generate_random_key,
    open, random_bytes,
};
use tracing::debug;
use zeroize::Zeroizing;

/// Default plaintext chunk size when the caller expresses no preference.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Smallest negotiable plaintext chunk size.
pub const MIN_CHUNK_SIZE: usize = 32;

/// Largest negotiable plaintext chunk size.
pub const MAX_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Chunk size used internally by stream sessions (recorded as 0 in the
/// content info; not negotiable).
pub(crate) const STREAM_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    Uninitialized,
    Encrypting,
    Decrypting,
    Finished,
}

/// Chunked envelope cryptor. See the module docs for the session contract.
pub struct ChunkCryptor {
    state: SessionState,
    registry: RecipientRegistry,
    kdf_params: KdfParams,
    content_info: Option<ContentInfo>,
    cek: Option<SymmetricKey>,
    session_nonce: [u8; NONCE_SIZE],
    /// Plaintext chunk size for the running session.
    chunk_size: usize,
    chunk_index: u64,
    bytes_processed: u64,
    saw_final_chunk: bool,
    finished_encrypting: bool,
}

impl Default for ChunkCryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkCryptor {
    pub fn new() -> Self {
        Self::with_kdf_params(KdfParams::default())
    }

    /// Creates a cryptor that will wrap password recipients with the given
    /// Argon2id costs.
    pub fn with_kdf_params(kdf_params: KdfParams) -> Self {
        Self {
            state: SessionState::Uninitialized,
            registry: RecipientRegistry::new(),
            kdf_params,
            content_info: None,
            cek: None,
            session_nonce: [0u8; NONCE_SIZE],
            chunk_size: 0,
            chunk_index: 0,
            bytes_processed: 0,
            saw_final_chunk: false,
            finished_encrypting: false,
        }
    }

    /// Creates a cryptor around an already-populated registry.
    pub fn from_registry(registry: RecipientRegistry) -> Self {
        Self {
            registry,
            ..Self::new()
        }
    }

    /// Creates a cryptor around an already-populated registry with explicit
    /// Argon2id costs for password recipients.
    pub fn from_registry_with_kdf_params(
        registry: RecipientRegistry,
        kdf_params: KdfParams,
    ) -> Self {
        Self {
            registry,
            ..Self::with_kdf_params(kdf_params)
        }
    }

    // ── Recipient registration (pre-session only) ──

    /// Registers a public-key recipient. Only valid before a session starts.
    pub fn add_key_recipient(&mut self, id: &[u8], public_key: &PublicKey) -> EnvelopeResult<()> {
        self.ensure_uninitialized("recipients can only be added before a session starts")?;
        self.registry.add_key_recipient(id, public_key)
    }

    /// Registers a password recipient. Only valid before a session starts.
    pub fn add_password_recipient(&mut self, password: &str) -> EnvelopeResult<()> {
        self.ensure_uninitialized("recipients can only be added before a session starts")?;
        self.registry.add_password_recipient(password);
        Ok(())
    }

    /// Removes a key recipient by id. Only valid before a session starts.
    pub fn remove_recipient(&mut self, id: &[u8]) -> EnvelopeResult<bool> {
        self.ensure_uninitialized("recipients can only be removed before a session starts")?;
        Ok(self.registry.remove_recipient(id))
    }

    /// Clears the registry. Only valid before a session starts.
    pub fn remove_all_recipients(&mut self) -> EnvelopeResult<()> {
        self.ensure_uninitialized("recipients can only be removed before a session starts")?;
        self.registry.remove_all_recipients();
        Ok(())
    }

    // ── Encryption ──

    /// Starts an encryption session and returns the authoritative plaintext
    /// chunk size. The preference is clamped to the supported range; 0 asks
    /// for the default. Callers must split their input accordingly.
    pub fn start_encryption(&mut self, preferred_chunk_size: usize) -> EnvelopeResult<usize> {
        let negotiated = if preferred_chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            preferred_chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
        };
        self.start_encryption_inner(negotiated, negotiated as u32)
    }

    /// Starts a stream-mode encryption session: the engine-chosen chunk size
    /// is used internally and the content info records chunk size 0.
    pub(crate) fn start_encryption_streaming(&mut self) -> EnvelopeResult<usize> {
        self.start_encryption_inner(STREAM_CHUNK_SIZE, 0)
    }

    fn start_encryption_inner(
        &mut self,
        chunk_size: usize,
        recorded_chunk_size: u32,
    ) -> EnvelopeResult<usize> {
        self.ensure_uninitialized("encryption already started or session finished")?;
        if self.content_info.is_some() {
            return Err(EnvelopeError::InvalidState(
                "content info was set for decryption; use a fresh instance to encrypt",
            ));
        }
        if self.registry.is_empty() {
            return Err(EnvelopeError::InvalidState(
                "at least one recipient must be registered before encryption",
            ));
        }

        let cek = generate_random_key();
        random_bytes(&mut self.session_nonce);

        let (key_recipients, password_recipients) = self.registry.wrap(&cek, &self.kdf_params)?;
        self.registry.remove_all_recipients();

        self.content_info = Some(ContentInfo {
            version: FORMAT_VERSION,
            cipher_algorithm: CipherAlgorithm::ChaCha20Poly1305,
            nonce: self.session_nonce,
            chunk_size: recorded_chunk_size,
            key_recipients,
            password_recipients,
        });
        self.cek = Some(cek);
        self.chunk_size = chunk_size;
        self.state = SessionState::Encrypting;

        debug!(chunk_size, "started encryption session");
        Ok(chunk_size)
    }

    // ── Decryption ──

    /// Parses and installs a content info blob. Only valid before a session
    /// starts; replaces any previously set blob.
    pub fn set_content_info(&mut self, blob: &[u8]) -> EnvelopeResult<()> {
        self.ensure_uninitialized("content info can only be set before a session starts")?;
        self.content_info = Some(ContentInfo::decode(blob)?);
        Ok(())
    }

    pub(crate) fn install_content_info(&mut self, info: ContentInfo) {
        self.content_info = Some(info);
    }

    pub(crate) fn has_content_info(&self) -> bool {
        self.content_info.is_some()
    }

    pub(crate) fn peek_content_info(&self) -> Option<&ContentInfo> {
        self.content_info.as_ref()
    }

    /// Whether the running session has already consumed its short final
    /// chunk. Stream decryption uses this to refuse an input that just
    /// stops on a chunk boundary.
    pub(crate) fn saw_final_chunk(&self) -> bool {
        self.saw_final_chunk
    }

    /// Starts a decryption session for a key recipient and returns the
    /// ciphertext chunk stride the caller must use to split input.
    ///
    /// Fails with `RecipientNotFound` when no entry matches the id exactly,
    /// and with `UnwrapFailed` when the entry exists but cannot be opened
    /// with the given secret key.
    pub fn start_decryption(
        &mut self,
        recipient_id: &[u8],
        secret_key: &SecretKey,
    ) -> EnvelopeResult<usize> {
        self.ensure_uninitialized("decryption already started or session finished")?;
        let info = self.require_content_info()?;

        let entry = info
            .find_key_recipient(recipient_id)
            .ok_or(EnvelopeError::RecipientNotFound)?;
        let sealed = SealedKey::from_bytes(&entry.wrap).map_err(|_| EnvelopeError::UnwrapFailed)?;
        let cek_bytes =
            Zeroizing::new(open(&sealed, secret_key).map_err(|_| EnvelopeError::UnwrapFailed)?);

        self.begin_decrypting(&cek_bytes)
    }

    /// Starts a decryption session for a password recipient and returns the
    /// ciphertext chunk stride.
    ///
    /// Entries carry no identifier, so every password entry is attempted in
    /// order; `RecipientNotFound` is reported when the envelope has no
    /// password recipients at all, `UnwrapFailed` when none of them opens
    /// with this password.
    pub fn start_decryption_with_password(&mut self, password: &str) -> EnvelopeResult<usize> {
        self.ensure_uninitialized("decryption already started or session finished")?;
        let entries = self.require_content_info()?.password_recipients.clone();

        if entries.is_empty() {
            return Err(EnvelopeError::RecipientNotFound);
        }

        for entry in &entries {
            let Ok(wrapping_key) = derive_key(password, &entry.salt, &entry.kdf_params) else {
                continue;
            };
            let Ok(encrypted) = EncryptedData::from_bytes(&entry.wrap) else {
                continue;
            };
            if let Ok(cek_bytes) = decrypt_detached(&wrapping_key, &encrypted) {
                return self.begin_decrypting(&Zeroizing::new(cek_bytes));
            }
        }
        Err(EnvelopeError::UnwrapFailed)
    }

    fn require_content_info(&self) -> EnvelopeResult<&ContentInfo> {
        self.content_info.as_ref().ok_or(EnvelopeError::InvalidState(
            "content info must be set before decryption",
        ))
    }

    fn begin_decrypting(&mut self, cek_bytes: &[u8]) -> EnvelopeResult<usize> {
        if cek_bytes.len() != KEY_SIZE {
            return Err(EnvelopeError::UnwrapFailed);
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(cek_bytes);
        self.cek = Some(SymmetricKey::from_bytes(key));

        let (nonce, recorded_chunk_size) = {
            let info = self.require_content_info()?;
            (info.nonce, info.chunk_size)
        };
        self.session_nonce = nonce;
        self.chunk_size = if recorded_chunk_size == 0 {
            STREAM_CHUNK_SIZE
        } else {
            recorded_chunk_size as usize
        };
        self.state = SessionState::Decrypting;

        debug!(chunk_size = self.chunk_size, "started decryption session");
        Ok(self.chunk_size + TAG_SIZE)
    }

    // ── Processing ──

    /// Transforms one chunk.
    ///
    /// Encrypting: the chunk must be exactly the negotiated size; a shorter
    /// (or empty) chunk is treated as the final chunk of the input, and a
    /// longer one fails with `ChunkSizeMismatch`. Returns the ciphertext for
    /// the chunk (plaintext length plus the authentication tag).
    ///
    /// Decrypting: the chunk must be split on the stride returned by
    /// `start_decryption`. A chunk that fails authentication poisons the
    /// session and returns `AuthenticationFailed`.
    pub fn process_data_chunk(&mut self, chunk: &[u8]) -> EnvelopeResult<Vec<u8>> {
        match self.state {
            SessionState::Encrypting => self.encrypt_one(chunk),
            SessionState::Decrypting => self.decrypt_one(chunk),
            _ => Err(EnvelopeError::InvalidState(
                "process_data_chunk requires a running session",
            )),
        }
    }

    fn encrypt_one(&mut self, chunk: &[u8]) -> EnvelopeResult<Vec<u8>> {
        if self.saw_final_chunk {
            return Err(EnvelopeError::InvalidState(
                "input already ended with a short chunk",
            ));
        }
        if chunk.len() > self.chunk_size {
            return Err(EnvelopeError::ChunkSizeMismatch {
                expected: self.chunk_size,
                actual: chunk.len(),
            });
        }
        let final_chunk = chunk.len() < self.chunk_size;

        let cek = self.cek.as_ref().ok_or(EnvelopeError::InvalidState(
            "no content key for running session",
        ))?;
        let ciphertext = encrypt_chunk(
            cek,
            &self.session_nonce,
            self.chunk_index,
            final_chunk,
            chunk,
        )?;

        self.saw_final_chunk = final_chunk;
        self.chunk_index += 1;
        self.bytes_processed += chunk.len() as u64;
        Ok(ciphertext)
    }

    fn decrypt_one(&mut self, chunk: &[u8]) -> EnvelopeResult<Vec<u8>> {
        if self.saw_final_chunk {
            return Err(EnvelopeError::InvalidState(
                "input already ended with a short chunk",
            ));
        }
        let stride = self.chunk_size + TAG_SIZE;
        if chunk.len() > stride {
            return Err(EnvelopeError::ChunkSizeMismatch {
                expected: stride,
                actual: chunk.len(),
            });
        }
        if chunk.len() < TAG_SIZE {
            self.poison();
            return Err(EnvelopeError::AuthenticationFailed);
        }
        let final_chunk = chunk.len() < stride;

        let cek = self.cek.as_ref().ok_or(EnvelopeError::InvalidState(
            "no content key for running session",
        ))?;
        let plaintext = match decrypt_chunk(
            cek,
            &self.session_nonce,
            self.chunk_index,
            final_chunk,
            chunk,
        ) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                self.poison();
                return Err(EnvelopeError::AuthenticationFailed);
            }
        };

        self.saw_final_chunk = final_chunk;
        self.chunk_index += 1;
        self.bytes_processed += plaintext.len() as u64;
        Ok(plaintext)
    }

    /// A poisoned session behaves like a finished one: every further call
    /// fails with `InvalidState`, and the content key is dropped immediately.
    fn poison(&mut self) {
        self.cek = None;
        self.state = SessionState::Finished;
    }

    // ── Finalization ──

    /// Ends the session. Encrypting: finalizes the content info (no further
    /// recipients, ever) and releases the content key. Decrypting: releases
    /// the content key. Calling `finish` without a running session fails with
    /// `InvalidState`.
    pub fn finish(&mut self) -> EnvelopeResult<()> {
        match self.state {
            SessionState::Encrypting => {
                self.finished_encrypting = true;
                self.cek = None;
                self.state = SessionState::Finished;
                debug!(
                    chunks = self.chunk_index,
                    bytes = self.bytes_processed,
                    "finished encryption session"
                );
                Ok(())
            }
            SessionState::Decrypting => {
                self.cek = None;
                self.state = SessionState::Finished;
                debug!(
                    chunks = self.chunk_index,
                    bytes = self.bytes_processed,
                    "finished decryption session"
                );
                Ok(())
            }
            _ => Err(EnvelopeError::InvalidState(
                "finish requires a running session",
            )),
        }
    }

    /// Returns the serialized content info. Only available after an
    /// encrypting session has finished.
    pub fn content_info(&self) -> EnvelopeResult<Vec<u8>> {
        if !self.finished_encrypting {
            return Err(EnvelopeError::InvalidState(
                "content info is only available after an encrypting session finishes",
            ));
        }
        let info = self.require_content_info()?;
        Ok(info.encode())
    }

    // ── Accounting ──

    /// Number of chunks processed so far in the running session.
    pub fn chunks_processed(&self) -> u64 {
        self.chunk_index
    }

    /// Number of plaintext bytes consumed (encrypting) or produced
    /// (decrypting) so far.
    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }

    fn ensure_uninitialized(&self, context: &'static str) -> EnvelopeResult<()> {
        if self.state != SessionState::Uninitialized {
            return Err(EnvelopeError::InvalidState(context));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealpack_crypto::KeyPair;

    fn cheap_params() -> KdfParams {
        KdfParams {
            m_cost: 64,
            t_cost: 1,
            p_cost: 1,
        }
    }

    #[test]
    fn process_before_start_fails() {
        let mut cryptor = ChunkCryptor::new();
        assert!(matches!(
            cryptor.process_data_chunk(b"data"),
            Err(EnvelopeError::InvalidState(_))
        ));
    }

    #[test]
    fn finish_before_start_fails() {
        let mut cryptor = ChunkCryptor::new();
        assert!(matches!(
            cryptor.finish(),
            Err(EnvelopeError::InvalidState(_))
        ));
    }

    #[test]
    fn start_without_recipients_fails() {
        let mut cryptor = ChunkCryptor::new();
        assert!(matches!(
            cryptor.start_encryption(1024),
            Err(EnvelopeError::InvalidState(_))
        ));
    }

    #[test]
    fn double_start_fails() {
        let kp = KeyPair::generate();
        let mut cryptor = ChunkCryptor::new();
        cryptor.add_key_recipient(b"r", &kp.public).unwrap();
        cryptor.start_encryption(1024).unwrap();
        assert!(matches!(
            cryptor.start_encryption(1024),
            Err(EnvelopeError::InvalidState(_))
        ));
        assert!(matches!(
            cryptor.start_decryption(b"r", &kp.secret),
            Err(EnvelopeError::InvalidState(_))
        ));
    }

    #[test]
    fn add_recipient_after_start_fails() {
        let kp = KeyPair::generate();
        let mut cryptor = ChunkCryptor::new();
        cryptor.add_key_recipient(b"r", &kp.public).unwrap();
        cryptor.start_encryption(1024).unwrap();
        assert!(matches!(
            cryptor.add_key_recipient(b"other", &kp.public),
            Err(EnvelopeError::InvalidState(_))
        ));
        assert!(matches!(
            cryptor.add_password_recipient("pw"),
            Err(EnvelopeError::InvalidState(_))
        ));
    }

    #[test]
    fn chunk_size_negotiation_clamps() {
        let kp = KeyPair::generate();

        let mut cryptor = ChunkCryptor::new();
        cryptor.add_key_recipient(b"r", &kp.public).unwrap();
        assert_eq!(cryptor.start_encryption(0).unwrap(), DEFAULT_CHUNK_SIZE);

        let mut cryptor = ChunkCryptor::new();
        cryptor.add_key_recipient(b"r", &kp.public).unwrap();
        assert_eq!(cryptor.start_encryption(1).unwrap(), MIN_CHUNK_SIZE);

        let mut cryptor = ChunkCryptor::new();
        cryptor.add_key_recipient(b"r", &kp.public).unwrap();
        assert_eq!(
            cryptor.start_encryption(usize::MAX).unwrap(),
            MAX_CHUNK_SIZE
        );
    }

    #[test]
    fn oversized_chunk_rejected_without_poisoning() {
        let kp = KeyPair::generate();
        let mut cryptor = ChunkCryptor::new();
        cryptor.add_key_recipient(b"r", &kp.public).unwrap();
        let size = cryptor.start_encryption(64).unwrap();

        let too_big = vec![0u8; size + 1];
        assert!(matches!(
            cryptor.process_data_chunk(&too_big),
            Err(EnvelopeError::ChunkSizeMismatch { .. })
        ));

        // The session is still usable with a correctly sized chunk.
        let ok = vec![0u8; size];
        assert!(cryptor.process_data_chunk(&ok).is_ok());
    }

    #[test]
    fn chunk_after_short_chunk_fails() {
        let kp = KeyPair::generate();
        let mut cryptor = ChunkCryptor::new();
        cryptor.add_key_recipient(b"r", &kp.public).unwrap();
        let size = cryptor.start_encryption(64).unwrap();

        cryptor.process_data_chunk(&vec![1u8; size - 1]).unwrap();
        assert!(matches!(
            cryptor.process_data_chunk(&vec![2u8; size]),
            Err(EnvelopeError::InvalidState(_))
        ));
    }

    #[test]
    fn content_info_gated_on_finish() {
        let kp = KeyPair::generate();
        let mut cryptor = ChunkCryptor::with_kdf_params(cheap_params());
        cryptor.add_key_recipient(b"r", &kp.public).unwrap();
        cryptor.start_encryption(64).unwrap();
        assert!(cryptor.content_info().is_err());

        cryptor.process_data_chunk(b"tail").unwrap();
        cryptor.finish().unwrap();
        assert!(cryptor.content_info().is_ok());
    }

    #[test]
    fn content_info_unavailable_after_decrypting_session() {
        let kp = KeyPair::generate();
        let mut cryptor = ChunkCryptor::with_kdf_params(cheap_params());
        cryptor.add_key_recipient(b"r", &kp.public).unwrap();
        cryptor.start_encryption(64).unwrap();
        let ct = cryptor.process_data_chunk(b"short").unwrap();
        cryptor.finish().unwrap();
        let blob = cryptor.content_info().unwrap();

        let mut decryptor = ChunkCryptor::new();
        decryptor.set_content_info(&blob).unwrap();
        decryptor.start_decryption(b"r", &kp.secret).unwrap();
        decryptor.process_data_chunk(&ct).unwrap();
        decryptor.finish().unwrap();
        assert!(decryptor.content_info().is_err());
    }

    #[test]
    fn decryption_requires_content_info() {
        let kp = KeyPair::generate();
        let mut cryptor = ChunkCryptor::new();
        assert!(matches!(
            cryptor.start_decryption(b"r", &kp.secret),
            Err(EnvelopeError::InvalidState(_))
        ));
        assert!(matches!(
            cryptor.start_decryption_with_password("pw"),
            Err(EnvelopeError::InvalidState(_))
        ));
    }

    #[test]
    fn accounting_tracks_plaintext_bytes() {
        let kp = KeyPair::generate();
        let mut cryptor = ChunkCryptor::with_kdf_params(cheap_params());
        cryptor.add_key_recipient(b"r", &kp.public).unwrap();
        let size = cryptor.start_encryption(64).unwrap();

        cryptor.process_data_chunk(&vec![0u8; size]).unwrap();
        cryptor.process_data_chunk(&vec![0u8; 10]).unwrap();
        assert_eq!(cryptor.chunks_processed(), 2);
        assert_eq!(cryptor.bytes_processed(), size as u64 + 10);
    }
}
