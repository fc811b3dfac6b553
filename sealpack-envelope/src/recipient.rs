//! Pre-session recipient registration and content-key wrapping.
//!
//! The registry only exists before a session starts. At start-of-encryption it
//! is consumed exactly once: the content key is sealed for every key
//! recipient and derived-key-encrypted for every password recipient, in
//! registration order. That order is preserved verbatim into the content info
//! so id-based and positional lookups stay stable across round trips.

use crate::content_info::{KeyRecipientEntry, PasswordRecipientEntry};
use crate::error::{EnvelopeError, EnvelopeResult};
use sealpack_crypto::{KdfParams, PublicKey, Salt, SymmetricKey, derive_key, encrypt_detached, seal};
use tracing::debug;
use zeroize::Zeroizing;

/// Set of recipients registered before encryption starts.
#[derive(Default)]
pub struct RecipientRegistry {
    key_recipients: Vec<(Vec<u8>, PublicKey)>,
    passwords: Vec<Zeroizing<String>>,
}

impl RecipientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a public-key recipient under an opaque id.
    ///
    /// Ids must be unique within one registry; re-registering an id fails
    /// with `DuplicateRecipient`.
    pub fn add_key_recipient(&mut self, id: &[u8], public_key: &PublicKey) -> EnvelopeResult<()> {
        if self.key_recipients.iter().any(|(existing, _)| existing == id) {
            return Err(EnvelopeError::DuplicateRecipient);
        }
        self.key_recipients.push((id.to_vec(), public_key.clone()));
        Ok(())
    }

    /// Registers a password recipient. No id is needed; list position is
    /// implicit. The same password may be registered more than once.
    pub fn add_password_recipient(&mut self, password: &str) {
        self.passwords.push(Zeroizing::new(password.to_string()));
    }

    /// Removes a key recipient by id. Returns whether an entry was removed.
    pub fn remove_recipient(&mut self, id: &[u8]) -> bool {
        let before = self.key_recipients.len();
        self.key_recipients.retain(|(existing, _)| existing != id);
        self.key_recipients.len() != before
    }

    /// Clears all registered recipients of both kinds.
    pub fn remove_all_recipients(&mut self) {
        self.key_recipients.clear();
        self.passwords.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.key_recipients.is_empty() && self.passwords.is_empty()
    }

    pub fn len(&self) -> usize {
        self.key_recipients.len() + self.passwords.len()
    }

    /// Wraps the content key for every registered recipient.
    ///
    /// Each password recipient gets an independent random salt, so two
    /// recipients sharing a password still produce distinct entries.
    pub(crate) fn wrap(
        &self,
        cek: &SymmetricKey,
        kdf_params: &KdfParams,
    ) -> EnvelopeResult<(Vec<KeyRecipientEntry>, Vec<PasswordRecipientEntry>)> {
        let mut key_entries = Vec::with_capacity(self.key_recipients.len());
        for (id, public_key) in &self.key_recipients {
            let sealed = seal(cek.as_bytes(), public_key)?;
            key_entries.push(KeyRecipientEntry {
                id: id.clone(),
                wrap: sealed.to_bytes(),
            });
        }

        let mut password_entries = Vec::with_capacity(self.passwords.len());
        for password in &self.passwords {
            let salt = Salt::random();
            let wrapping_key = derive_key(password, &salt, kdf_params)?;
            let encrypted = encrypt_detached(&wrapping_key, cek.as_bytes())?;
            password_entries.push(PasswordRecipientEntry {
                salt,
                kdf_params: *kdf_params,
                wrap: encrypted.to_bytes(),
            });
        }

        debug!(
            key_recipients = key_entries.len(),
            password_recipients = password_entries.len(),
            "wrapped content key for recipients"
        );
        Ok((key_entries, password_entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealpack_crypto::{KeyPair, generate_random_key};

    fn cheap_params() -> KdfParams {
        KdfParams {
            m_cost: 64,
            t_cost: 1,
            p_cost: 1,
        }
    }

    #[test]
    fn duplicate_id_rejected() {
        let kp = KeyPair::generate();
        let mut registry = RecipientRegistry::new();
        registry.add_key_recipient(b"alice", &kp.public).unwrap();
        assert!(matches!(
            registry.add_key_recipient(b"alice", &kp.public),
            Err(EnvelopeError::DuplicateRecipient)
        ));
    }

    #[test]
    fn remove_recipient_by_id() {
        let kp = KeyPair::generate();
        let mut registry = RecipientRegistry::new();
        registry.add_key_recipient(b"alice", &kp.public).unwrap();
        assert!(registry.remove_recipient(b"alice"));
        assert!(!registry.remove_recipient(b"alice"));
        assert!(registry.is_empty());
    }

    #[test]
    fn wrap_preserves_registration_order() {
        let kp_a = KeyPair::generate();
        let kp_b = KeyPair::generate();
        let mut registry = RecipientRegistry::new();
        registry.add_key_recipient(b"alice", &kp_a.public).unwrap();
        registry.add_key_recipient(b"bob", &kp_b.public).unwrap();

        let cek = generate_random_key();
        let (keys, _) = registry.wrap(&cek, &cheap_params()).unwrap();
        assert_eq!(keys[0].id, b"alice");
        assert_eq!(keys[1].id, b"bob");
    }

    #[test]
    fn same_password_twice_yields_distinct_entries() {
        let mut registry = RecipientRegistry::new();
        registry.add_password_recipient("secret");
        registry.add_password_recipient("secret");

        let cek = generate_random_key();
        let (_, pwds) = registry.wrap(&cek, &cheap_params()).unwrap();
        assert_eq!(pwds.len(), 2);
        assert_ne!(pwds[0].salt, pwds[1].salt);
        assert_ne!(pwds[0].wrap, pwds[1].wrap);
    }
}
