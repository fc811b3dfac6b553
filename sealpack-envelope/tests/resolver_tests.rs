//! One-shot resolver round trips.

use sealpack_envelope::{
    EnvelopeError, KdfParams, KeyPair, RecipientRegistry, resolver,
};

fn cheap_params() -> KdfParams {
    KdfParams {
        m_cost: 64,
        t_cost: 1,
        p_cost: 1,
    }
}

fn random_data(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    sealpack_crypto::random_bytes(&mut data);
    data
}

#[test]
fn key_based_one_shot_round_trip() {
    let plaintext = random_data(10_000);
    let kp = KeyPair::generate();

    let mut registry = RecipientRegistry::new();
    registry.add_key_recipient(b"alice", &kp.public).unwrap();

    let envelope = resolver::encrypt(&plaintext, registry, 0, cheap_params()).unwrap();
    let recovered = resolver::decrypt_with_key(
        &envelope.content_info,
        &envelope.ciphertext,
        b"alice",
        &kp.secret,
    )
    .unwrap();

    assert_eq!(recovered, plaintext);
}

#[test]
fn password_based_one_shot_round_trip() {
    let plaintext = b"short utf-8 message".to_vec();

    let mut registry = RecipientRegistry::new();
    registry.add_password_recipient("secret");

    let envelope = resolver::encrypt(&plaintext, registry, 256, cheap_params()).unwrap();

    let recovered =
        resolver::decrypt_with_password(&envelope.content_info, &envelope.ciphertext, "secret")
            .unwrap();
    assert_eq!(recovered, plaintext);

    assert!(matches!(
        resolver::decrypt_with_password(&envelope.content_info, &envelope.ciphertext, "wrong"),
        Err(EnvelopeError::UnwrapFailed)
    ));
}

#[test]
fn embedded_one_shot_round_trip() {
    let plaintext = random_data(5000);
    let kp = KeyPair::generate();

    let mut registry = RecipientRegistry::new();
    registry.add_key_recipient(b"alice", &kp.public).unwrap();
    registry.add_password_recipient("secret");

    let envelope = resolver::encrypt(&plaintext, registry, 1024, cheap_params()).unwrap();
    let payload = envelope.into_embedded().unwrap();

    let by_key = resolver::decrypt_embedded_with_key(&payload, b"alice", &kp.secret).unwrap();
    assert_eq!(by_key, plaintext);

    let by_password = resolver::decrypt_embedded_with_password(&payload, "secret").unwrap();
    assert_eq!(by_password, plaintext);
}

#[test]
fn unknown_recipient_surfaces_not_found() {
    let kp = KeyPair::generate();
    let stranger = KeyPair::generate();

    let mut registry = RecipientRegistry::new();
    registry.add_key_recipient(b"alice", &kp.public).unwrap();
    let envelope = resolver::encrypt(b"payload", registry, 0, cheap_params()).unwrap();

    assert!(matches!(
        resolver::decrypt_with_key(
            &envelope.content_info,
            &envelope.ciphertext,
            b"mallory",
            &stranger.secret,
        ),
        Err(EnvelopeError::RecipientNotFound)
    ));
}

#[test]
fn encrypt_with_empty_registry_fails() {
    let registry = RecipientRegistry::new();
    assert!(matches!(
        resolver::encrypt(b"payload", registry, 0, cheap_params()),
        Err(EnvelopeError::InvalidState(_))
    ));
}

#[test]
fn tampered_ciphertext_surfaces_authentication_failure() {
    let kp = KeyPair::generate();
    let mut registry = RecipientRegistry::new();
    registry.add_key_recipient(b"alice", &kp.public).unwrap();

    let mut envelope = resolver::encrypt(&random_data(2048), registry, 512, cheap_params()).unwrap();
    envelope.ciphertext[100] ^= 0x01;

    assert!(matches!(
        resolver::decrypt_with_key(
            &envelope.content_info,
            &envelope.ciphertext,
            b"alice",
            &kp.secret,
        ),
        Err(EnvelopeError::AuthenticationFailed)
    ));
}
