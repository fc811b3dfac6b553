//! One-pass streaming envelope encryption over readers and writers.
//!
//! `StreamCryptor` drives the chunk state machine internally: it pulls from
//! an input source until exhaustion, pushes ciphertext (or plaintext) to an
//! output sink incrementally, and never buffers more than one chunk. Sources
//! and sinks of unknown total length are fine; short reads and writes are
//! retried internally rather than treated as errors.
//!
//! The content info can either be embedded at the head of the output stream
//! (`embed_content_info = true`) or fetched separately after encryption via
//! [`StreamCryptor::content_info`]. On decryption, an embedded header is
//! parsed from the stream head exactly when no detached content info was
//! supplied beforehand.
//!
//! Encrypted streams always end in a short terminator frame, even when the
//! input length is an exact multiple of the chunk size; decryption requires
//! that terminator, so a ciphertext with trailing chunks deleted fails
//! instead of yielding silently truncated plaintext.

use crate::chunk::{ChunkCryptor, STREAM_CHUNK_SIZE};
use crate::content_info::ContentInfo;
use crate::error::{EnvelopeError, EnvelopeResult};
use sealpack_crypto::{KdfParams, PublicKey, SecretKey};
use std::io::{ErrorKind, Read, Write};
use tracing::debug;

/// Largest embedded content-info header the decrypting side will accept.
const MAX_EMBEDDED_INFO_LEN: usize = 16 * 1024 * 1024;

/// Streaming envelope cryptor. One instance drives one session.
pub struct StreamCryptor {
    inner: ChunkCryptor,
}

impl Default for StreamCryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamCryptor {
    pub fn new() -> Self {
        Self {
            inner: ChunkCryptor::new(),
        }
    }

    /// Creates a cryptor that will wrap password recipients with the given
    /// Argon2id costs.
    pub fn with_kdf_params(kdf_params: KdfParams) -> Self {
        Self {
            inner: ChunkCryptor::with_kdf_params(kdf_params),
        }
    }

    /// Registers a public-key recipient. Only valid before a session starts.
    pub fn add_key_recipient(&mut self, id: &[u8], public_key: &PublicKey) -> EnvelopeResult<()> {
        self.inner.add_key_recipient(id, public_key)
    }

    /// Registers a password recipient. Only valid before a session starts.
    pub fn add_password_recipient(&mut self, password: &str) -> EnvelopeResult<()> {
        self.inner.add_password_recipient(password)
    }

    /// Installs a detached content info blob ahead of decryption.
    pub fn set_content_info(&mut self, blob: &[u8]) -> EnvelopeResult<()> {
        self.inner.set_content_info(blob)
    }

    /// Returns the serialized content info after an encrypting session, for
    /// the detached flow.
    pub fn content_info(&self) -> EnvelopeResult<Vec<u8>> {
        self.inner.content_info()
    }

    /// Encrypts everything `source` yields into `sink`.
    ///
    /// With `embed_content_info` the serialized content info is written
    /// length-prefixed ahead of the ciphertext; otherwise the caller fetches
    /// it via [`content_info`] and transmits it out of band.
    ///
    /// [`content_info`]: StreamCryptor::content_info
    pub fn encrypt<R: Read, W: Write>(
        &mut self,
        source: &mut R,
        sink: &mut W,
        embed_content_info: bool,
    ) -> EnvelopeResult<()> {
        self.inner.start_encryption_streaming()?;

        if embed_content_info {
            let info = self.inner.peek_content_info().ok_or(
                EnvelopeError::InvalidState("no content info after session start"),
            )?;
            sink.write_all(&info.encode_embedded())?;
        }

        let written = self.pump_encrypt(source, sink)?;
        debug!(bytes = written, embedded = embed_content_info, "stream encryption complete");
        Ok(())
    }

    /// Decrypts a stream for a key recipient.
    ///
    /// If no detached content info was set, an embedded header is read from
    /// the head of `source` first.
    pub fn decrypt_with_key<R: Read, W: Write>(
        &mut self,
        source: &mut R,
        sink: &mut W,
        recipient_id: &[u8],
        secret_key: &SecretKey,
    ) -> EnvelopeResult<()> {
        self.ensure_content_info(source)?;
        let stride = self.inner.start_decryption(recipient_id, secret_key)?;
        self.pump_decrypt(source, sink, stride)?;
        Ok(())
    }

    /// Decrypts a stream for a password recipient.
    ///
    /// If no detached content info was set, an embedded header is read from
    /// the head of `source` first.
    pub fn decrypt_with_password<R: Read, W: Write>(
        &mut self,
        source: &mut R,
        sink: &mut W,
        password: &str,
    ) -> EnvelopeResult<()> {
        self.ensure_content_info(source)?;
        let stride = self.inner.start_decryption_with_password(password)?;
        self.pump_decrypt(source, sink, stride)?;
        Ok(())
    }

    /// Reads an embedded content-info header unless a detached one is
    /// already installed.
    fn ensure_content_info<R: Read>(&mut self, source: &mut R) -> EnvelopeResult<()> {
        if self.inner.has_content_info() {
            return Ok(());
        }

        let mut len_buf = [0u8; 4];
        read_exact_or_malformed(source, &mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len == 0 || len > MAX_EMBEDDED_INFO_LEN {
            return Err(EnvelopeError::MalformedContentInfo(
                "embedded header length out of range",
            ));
        }

        let mut blob = vec![0u8; len];
        read_exact_or_malformed(source, &mut blob)?;
        let info = ContentInfo::decode(&blob)?;
        self.inner.install_content_info(info);
        Ok(())
    }

    /// Encrypts source chunks until exhaustion, then finishes the session.
    /// An input ending on a chunk boundary (including an empty input) still
    /// emits a short terminator frame for an empty final chunk, so the
    /// ciphertext length marks end of stream unambiguously. Returns the
    /// number of input bytes consumed.
    fn pump_encrypt<R: Read, W: Write>(
        &mut self,
        source: &mut R,
        sink: &mut W,
    ) -> EnvelopeResult<u64> {
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        let mut consumed = 0u64;
        loop {
            let filled = read_full(source, &mut buf)?;
            consumed += filled as u64;
            let output = self.inner.process_data_chunk(&buf[..filled])?;
            sink.write_all(&output)?;
            if filled < STREAM_CHUNK_SIZE {
                break;
            }
        }
        self.inner.finish()?;
        sink.flush()?;
        Ok(consumed)
    }

    /// Decrypts stride-sized ciphertext chunks until the terminator frame,
    /// then finishes the session. A source that runs dry without having
    /// delivered the short final chunk is a truncated ciphertext and fails
    /// authentication. Returns the number of input bytes consumed.
    fn pump_decrypt<R: Read, W: Write>(
        &mut self,
        source: &mut R,
        sink: &mut W,
        stride: usize,
    ) -> EnvelopeResult<u64> {
        let mut buf = vec![0u8; stride];
        let mut consumed = 0u64;
        loop {
            let filled = read_full(source, &mut buf)?;
            if filled == 0 {
                break;
            }
            consumed += filled as u64;
            let output = self.inner.process_data_chunk(&buf[..filled])?;
            sink.write_all(&output)?;
            if filled < stride {
                break;
            }
        }
        if !self.inner.saw_final_chunk() {
            return Err(EnvelopeError::AuthenticationFailed);
        }
        self.inner.finish()?;
        sink.flush()?;
        Ok(consumed)
    }
}

/// Fills `buf` as far as the source allows, retrying short reads; returns
/// the number of bytes read (less than `buf.len()` only at end of input).
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Like `read_exact`, but reports a truncated stream as a malformed header
/// rather than a bare I/O error.
fn read_exact_or_malformed<R: Read>(source: &mut R, buf: &mut [u8]) -> EnvelopeResult<()> {
    let filled = read_full(source, buf)?;
    if filled != buf.len() {
        return Err(EnvelopeError::MalformedContentInfo(
            "stream ended inside embedded content info",
        ));
    }
    Ok(())
}
