//! Envelope metadata and its binary wire format.
//!
//! A `ContentInfo` carries everything a recipient needs to recover the
//! content-encryption key and decrypt the payload: algorithm ids, the bulk
//! session nonce, the negotiated chunk size (0 for stream mode), and one
//! wrapped-key entry per recipient, in registration order.
//!
//! The wire format is self-describing and fixed-width: every integer and
//! every length prefix is an unsigned 32-bit big-endian value. The same codec
//! serves the detached form (the bare structure) and the embedded form (the
//! structure length-prefixed as a whole and prepended to the ciphertext
//! stream). Decoding rejects truncated, overlong, and internally inconsistent
//! blobs; it never trusts a declared length beyond the remaining buffer.

use crate::chunk::MAX_CHUNK_SIZE;
use crate::error::{EnvelopeError, EnvelopeResult};
use sealpack_crypto::{KdfParams, NONCE_SIZE, SALT_SIZE, Salt};
use serde::{Deserialize, Serialize};

/// Version of the wire format produced by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// Upper bound on any single declared field length, to reject allocation
/// bombs before a buffer is reserved.
const MAX_FIELD_LEN: usize = 1 << 20;

/// Upper bound on the declared recipient count per kind.
const MAX_RECIPIENTS: usize = 4096;

/// Bulk cipher used for payload chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    ChaCha20Poly1305,
}

impl CipherAlgorithm {
    /// Stable wire identifier.
    pub fn wire_id(self) -> u32 {
        match self {
            CipherAlgorithm::ChaCha20Poly1305 => 1,
        }
    }

    pub fn from_wire_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(CipherAlgorithm::ChaCha20Poly1305),
            _ => None,
        }
    }
}

/// A content key wrapped for one public-key recipient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecipientEntry {
    /// Opaque recipient id, unique within the envelope. Exact match only.
    pub id: Vec<u8>,
    /// Sealed content key (opaque to this layer).
    pub wrap: Vec<u8>,
}

/// A content key wrapped for one password recipient.
///
/// Carries no identifier; any password may attempt any entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordRecipientEntry {
    /// Per-recipient random KDF salt.
    pub salt: Salt,
    /// Argon2id costs used to derive this entry's wrapping key.
    pub kdf_params: KdfParams,
    /// Content key encrypted under the derived key (opaque to this layer).
    pub wrap: Vec<u8>,
}

/// Serializable envelope metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInfo {
    pub version: u32,
    pub cipher_algorithm: CipherAlgorithm,
    /// Bulk session nonce; per-chunk nonces are derived from it.
    pub nonce: [u8; NONCE_SIZE],
    /// Negotiated plaintext chunk size, or 0 for stream-continuous mode.
    pub chunk_size: u32,
    pub key_recipients: Vec<KeyRecipientEntry>,
    pub password_recipients: Vec<PasswordRecipientEntry>,
}

impl ContentInfo {
    /// Looks up a key-recipient entry by exact id match.
    pub fn find_key_recipient(&self, id: &[u8]) -> Option<&KeyRecipientEntry> {
        self.key_recipients.iter().find(|entry| entry.id == id)
    }

    /// Total number of recipients of either kind.
    pub fn recipient_count(&self) -> usize {
        self.key_recipients.len() + self.password_recipients.len()
    }

    /// Serializes to the detached wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_hint());
        put_u32(&mut out, self.version);
        put_u32(&mut out, self.cipher_algorithm.wire_id());
        put_bytes(&mut out, &self.nonce);
        put_u32(&mut out, self.chunk_size);

        put_u32(&mut out, self.key_recipients.len() as u32);
        for entry in &self.key_recipients {
            put_bytes(&mut out, &entry.id);
            put_bytes(&mut out, &entry.wrap);
        }

        put_u32(&mut out, self.password_recipients.len() as u32);
        for entry in &self.password_recipients {
            put_bytes(&mut out, entry.salt.as_bytes());
            put_u32(&mut out, entry.kdf_params.m_cost);
            put_u32(&mut out, entry.kdf_params.t_cost);
            put_u32(&mut out, entry.kdf_params.p_cost);
            put_bytes(&mut out, &entry.wrap);
        }
        out
    }

    /// Serializes to the embedded form: the detached form length-prefixed as
    /// a whole, suitable for prepending to the ciphertext stream.
    pub fn encode_embedded(&self) -> Vec<u8> {
        let body = self.encode();
        let mut out = Vec::with_capacity(4 + body.len());
        put_u32(&mut out, body.len() as u32);
        out.extend_from_slice(&body);
        out
    }

    /// Parses the detached wire form, requiring the buffer to be consumed
    /// exactly.
    pub fn decode(buf: &[u8]) -> EnvelopeResult<Self> {
        let mut reader = Reader::new(buf);
        let info = Self::read_from(&mut reader)?;
        if !reader.is_empty() {
            return Err(EnvelopeError::MalformedContentInfo(
                "trailing bytes after content info",
            ));
        }
        Ok(info)
    }

    /// Splits an embedded payload into its content info and the ciphertext
    /// that follows it.
    pub fn split_embedded(buf: &[u8]) -> EnvelopeResult<(Self, &[u8])> {
        let mut reader = Reader::new(buf);
        let len = reader.u32()? as usize;
        let body = reader.bytes(len)?;
        let info = Self::decode(body)?;
        Ok((info, reader.rest()))
    }

    fn read_from(reader: &mut Reader<'_>) -> EnvelopeResult<Self> {
        let version = reader.u32()?;
        if version != FORMAT_VERSION {
            return Err(EnvelopeError::MalformedContentInfo(
                "unsupported format version",
            ));
        }

        let cipher_algorithm = CipherAlgorithm::from_wire_id(reader.u32()?)
            .ok_or(EnvelopeError::MalformedContentInfo("unknown cipher algorithm"))?;

        let nonce_bytes = reader.len_prefixed()?;
        let nonce: [u8; NONCE_SIZE] = nonce_bytes
            .try_into()
            .map_err(|_| EnvelopeError::MalformedContentInfo("bad nonce length"))?;

        // 0 means stream mode; anything above the negotiable ceiling is a
        // decompression-bomb-style allocation request, not a real envelope.
        let chunk_size = reader.u32()?;
        if chunk_size as usize > MAX_CHUNK_SIZE {
            return Err(EnvelopeError::MalformedContentInfo(
                "chunk size out of range",
            ));
        }

        let key_count = reader.count()?;
        let mut key_recipients = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            let id = reader.len_prefixed()?.to_vec();
            let wrap = reader.len_prefixed()?.to_vec();
            key_recipients.push(KeyRecipientEntry { id, wrap });
        }

        let password_count = reader.count()?;
        let mut password_recipients = Vec::with_capacity(password_count);
        for _ in 0..password_count {
            let salt_bytes: [u8; SALT_SIZE] = reader
                .len_prefixed()?
                .try_into()
                .map_err(|_| EnvelopeError::MalformedContentInfo("bad salt length"))?;
            let kdf_params = KdfParams {
                m_cost: reader.u32()?,
                t_cost: reader.u32()?,
                p_cost: reader.u32()?,
            };
            let wrap = reader.len_prefixed()?.to_vec();
            password_recipients.push(PasswordRecipientEntry {
                salt: Salt::from_bytes(salt_bytes),
                kdf_params,
                wrap,
            });
        }

        if key_recipients.is_empty() && password_recipients.is_empty() {
            return Err(EnvelopeError::MalformedContentInfo(
                "content info has no recipients",
            ));
        }

        let mut seen: Vec<&[u8]> = Vec::with_capacity(key_recipients.len());
        for entry in &key_recipients {
            if seen.contains(&entry.id.as_slice()) {
                return Err(EnvelopeError::MalformedContentInfo(
                    "duplicate key recipient id",
                ));
            }
            seen.push(&entry.id);
        }

        Ok(ContentInfo {
            version,
            cipher_algorithm,
            nonce,
            chunk_size,
            key_recipients,
            password_recipients,
        })
    }

    fn encoded_hint(&self) -> usize {
        let key_len: usize = self
            .key_recipients
            .iter()
            .map(|e| 8 + e.id.len() + e.wrap.len())
            .sum();
        let pwd_len: usize = self
            .password_recipients
            .iter()
            .map(|e| 20 + SALT_SIZE + e.wrap.len())
            .sum();
        24 + NONCE_SIZE + key_len + pwd_len
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

/// Bounds-checked cursor over an undecoded blob.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn rest(self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn u32(&mut self) -> EnvelopeResult<u32> {
        let bytes = self.bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn bytes(&mut self, len: usize) -> EnvelopeResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(EnvelopeError::MalformedContentInfo(
                "declared length exceeds remaining buffer",
            ))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn len_prefixed(&mut self) -> EnvelopeResult<&'a [u8]> {
        let len = self.u32()? as usize;
        if len > MAX_FIELD_LEN {
            return Err(EnvelopeError::MalformedContentInfo(
                "declared field length unreasonably large",
            ));
        }
        self.bytes(len)
    }

    fn count(&mut self) -> EnvelopeResult<usize> {
        let count = self.u32()? as usize;
        if count > MAX_RECIPIENTS {
            return Err(EnvelopeError::MalformedContentInfo(
                "declared recipient count unreasonably large",
            ));
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContentInfo {
        ContentInfo {
            version: FORMAT_VERSION,
            cipher_algorithm: CipherAlgorithm::ChaCha20Poly1305,
            nonce: [9u8; NONCE_SIZE],
            chunk_size: 1024,
            key_recipients: vec![KeyRecipientEntry {
                id: b"alice".to_vec(),
                wrap: vec![1, 2, 3, 4],
            }],
            password_recipients: vec![PasswordRecipientEntry {
                salt: Salt::from_bytes([5u8; SALT_SIZE]),
                kdf_params: KdfParams::default(),
                wrap: vec![6, 7, 8],
            }],
        }
    }

    #[test]
    fn unknown_algorithm_rejected() {
        let mut encoded = sample().encode();
        // cipher algorithm id sits right after the version word
        encoded[7] = 0xEE;
        assert!(matches!(
            ContentInfo::decode(&encoded),
            Err(EnvelopeError::MalformedContentInfo(_))
        ));
    }

    #[test]
    fn unknown_version_rejected() {
        let mut encoded = sample().encode();
        encoded[3] = 0xEE;
        assert!(matches!(
            ContentInfo::decode(&encoded),
            Err(EnvelopeError::MalformedContentInfo(_))
        ));
    }

    #[test]
    fn every_truncation_rejected() {
        let encoded = sample().encode();
        for len in 0..encoded.len() {
            assert!(
                ContentInfo::decode(&encoded[..len]).is_err(),
                "truncation to {len} bytes should fail"
            );
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut encoded = sample().encode();
        encoded.push(0);
        assert!(matches!(
            ContentInfo::decode(&encoded),
            Err(EnvelopeError::MalformedContentInfo(_))
        ));
    }

    #[test]
    fn recipientless_info_rejected() {
        let mut info = sample();
        info.key_recipients.clear();
        info.password_recipients.clear();
        let encoded = info.encode();
        assert!(matches!(
            ContentInfo::decode(&encoded),
            Err(EnvelopeError::MalformedContentInfo(_))
        ));
    }

    #[test]
    fn duplicate_key_recipient_id_rejected() {
        let mut info = sample();
        info.key_recipients.push(info.key_recipients[0].clone());
        assert!(ContentInfo::decode(&info.encode()).is_err());
    }
}
