//! Authenticated-encryption-at-rest for secrets.
//!
//! Secrets share the settings resolver's key space, but the write path
//! encrypts with AES-SIV (misuse-resistant authenticated encryption) using a
//! per-secret data key derived from a process-provided master key via HKDF.
//! The read path never returns plaintext except through
//! [`crate::service::ConfigService::reveal_secret`].

use aes_siv::aead::generic_array::GenericArray;
use aes_siv::aead::{Aead, KeyInit};
use aes_siv::Aes256SivAead;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

use crate::error::ConfigError;

const NONCE_LEN: usize = 16;
const DATA_KEY_LEN: usize = 64;

fn derive_data_key(master_key: &[u8], secret_key: &str) -> [u8; DATA_KEY_LEN] {
    let hk = Hkdf::<Sha256>::new(Some(b"pgfront-config/secret-data-key"), master_key);
    let mut data_key = [0u8; DATA_KEY_LEN];
    hk.expand(secret_key.as_bytes(), &mut data_key)
        .expect("HKDF-SHA256 output length is within the allowed range");
    data_key
}

/// Encrypt `plaintext` for storage under `secret_key`, returning a
/// base64-encoded `nonce || ciphertext` blob safe to store as a text
/// column.
#[must_use]
pub fn encrypt(master_key: &[u8], secret_key: &str, plaintext: &str) -> String {
    let data_key = derive_data_key(master_key, secret_key);
    let cipher = Aes256SivAead::new(GenericArray::from_slice(&data_key));

    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(GenericArray::from_slice(&nonce), plaintext.as_bytes())
        .expect("AES-SIV encryption of a bounded plaintext cannot fail");

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    BASE64.encode(blob)
}

/// Decrypt a blob previously produced by [`encrypt`] for the same
/// `secret_key`.
///
/// # Errors
///
/// Returns [`ConfigError::SecretDecryptFailed`] if the blob is malformed,
/// the master key does not match, or the ciphertext has been tampered with.
pub fn decrypt(master_key: &[u8], secret_key: &str, blob: &str) -> Result<String, ConfigError> {
    let decode_err = || ConfigError::SecretDecryptFailed {
        key: secret_key.to_string(),
    };

    let raw = BASE64.decode(blob).map_err(|_| decode_err())?;
    if raw.len() <= NONCE_LEN {
        return Err(decode_err());
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_LEN);

    let data_key = derive_data_key(master_key, secret_key);
    let cipher = Aes256SivAead::new(GenericArray::from_slice(&data_key));

    let plaintext = cipher
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| decode_err())?;

    String::from_utf8(plaintext).map_err(|_| decode_err())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_secret() {
        let master_key = b"0123456789abcdef0123456789abcdef";
        let blob = encrypt(master_key, "email.smtp_password", "hunter2");
        let plaintext = decrypt(master_key, "email.smtp_password", &blob).unwrap();
        assert_eq!(plaintext, "hunter2");
    }

    #[test]
    fn decrypt_fails_under_a_different_master_key() {
        let blob = encrypt(b"master-key-one-aaaaaaaaaaaaaaaaa", "captcha.secret", "shh");
        let result = decrypt(b"master-key-two-bbbbbbbbbbbbbbbbb", "captcha.secret", &blob);
        assert!(result.is_err());
    }

    #[test]
    fn decrypt_fails_under_a_different_secret_key_context() {
        let master_key = b"same-master-key-cccccccccccccccc";
        let blob = encrypt(master_key, "captcha.secret", "shh");
        let result = decrypt(master_key, "email.smtp_password", &blob);
        assert!(result.is_err());
    }

    #[test]
    fn decrypt_rejects_malformed_blobs() {
        let result = decrypt(b"any-key-any-key-any-key-any-key!", "k", "not-base64!!!");
        assert!(result.is_err());
    }
}
