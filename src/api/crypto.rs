//! Symmetric encryption of webhook payloads.
//!
//! Payloads are sealed with AES-256-GCM. The key is the SHA-256 digest of the
//! secret issued at device registration; each message gets a fresh random
//! 96-bit nonce which is prepended to the ciphertext. The result travels
//! base64 encoded.

use crate::api::types::CodecError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

fn cipher(secret: &str) -> Aes256Gcm {
    let key = Sha256::digest(secret.as_bytes());
    Aes256Gcm::new(&key)
}

/// Encrypt `plaintext` with `secret`, returning base64 text.
pub fn encrypt(secret: &str, plaintext: &[u8]) -> Result<String, CodecError> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher(secret)
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CodecError::Encryption(e.to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(sealed))
}

/// Reverse of [`encrypt`].
pub fn decrypt(secret: &str, encoded: &str) -> Result<Vec<u8>, CodecError> {
    let sealed = BASE64
        .decode(encoded)
        .map_err(|e| CodecError::Encryption(format!("invalid base64: {e}")))?;
    if sealed.len() < NONCE_LEN {
        return Err(CodecError::Encryption("ciphertext too short".to_string()));
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    cipher(secret)
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| CodecError::Encryption(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_then_decrypt() {
        let sealed = encrypt("fakeSecret", br#"{"someField":"someValue"}"#).unwrap();
        assert_ne!(sealed, r#"{"someField":"someValue"}"#);

        let opened = decrypt("fakeSecret", &sealed).unwrap();
        assert_eq!(opened, br#"{"someField":"someValue"}"#);
    }

    #[test]
    fn test_nonce_is_fresh() {
        let a = encrypt("fakeSecret", b"payload").unwrap();
        let b = encrypt("fakeSecret", b"payload").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let sealed = encrypt("fakeSecret", b"payload").unwrap();
        assert!(matches!(
            decrypt("otherSecret", &sealed),
            Err(CodecError::Encryption(_))
        ));
    }

    #[test]
    fn test_truncated_input_fails() {
        assert!(decrypt("fakeSecret", "AAAA").is_err());
        assert!(decrypt("fakeSecret", "not base64!").is_err());
    }
}
