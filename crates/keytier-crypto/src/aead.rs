//! Single-shot AES-256-GCM seal/open with detached tags
//!
//! Every call to [`seal`] draws a fresh random 96-bit nonce. [`open`] fails
//! closed: the output buffer is scrubbed before an authentication error is
//! returned, so no partial plaintext ever leaves this module.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use rand::RngCore;
use zeroize::Zeroize;

use keytier_core::{KeytierError, KeytierResult};

use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Output of one AEAD seal operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> KeytierResult<Sealed> {
    let cipher = Aes256Gcm::new(key.into());

    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut buffer = plaintext.to_vec();
    match cipher.encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer) {
        Ok(tag) => {
            let mut tag_bytes = [0u8; TAG_SIZE];
            tag_bytes.copy_from_slice(&tag);
            Ok(Sealed {
                nonce,
                tag: tag_bytes,
                ciphertext: buffer,
            })
        }
        Err(e) => {
            buffer.zeroize();
            Err(KeytierError::Seal(format!("AES-256-GCM refused input: {e}")))
        }
    }
}

/// Decrypt and authenticate a sealed triple.
pub fn open(key: &[u8; KEY_SIZE], sealed: &Sealed) -> KeytierResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());

    let mut buffer = sealed.ciphertext.clone();
    let verified = cipher.decrypt_in_place_detached(
        Nonce::from_slice(&sealed.nonce),
        b"",
        &mut buffer,
        Tag::from_slice(&sealed.tag),
    );

    match verified {
        Ok(()) => Ok(buffer),
        Err(_) => {
            buffer.zeroize();
            Err(KeytierError::AuthenticationFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_SIZE] = [0x42; KEY_SIZE];

    #[test]
    fn test_seal_open_roundtrip() {
        let sealed = seal(&KEY, b"hello, sealed world!").unwrap();
        let opened = open(&KEY, &sealed).unwrap();
        assert_eq!(opened, b"hello, sealed world!");
    }

    #[test]
    fn test_seal_open_empty() {
        let sealed = seal(&KEY, b"").unwrap();
        assert!(sealed.ciphertext.is_empty());
        assert_eq!(open(&KEY, &sealed).unwrap(), b"");
    }

    #[test]
    fn test_ciphertext_length_matches_plaintext() {
        let sealed = seal(&KEY, &[0u8; 1000]).unwrap();
        assert_eq!(sealed.ciphertext.len(), 1000);
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let a = seal(&KEY, b"same input").unwrap();
        let b = seal(&KEY, b"same input").unwrap();
        assert_ne!(a.nonce, b.nonce, "nonces must not repeat");
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_open_wrong_key() {
        let sealed = seal(&KEY, b"secret data").unwrap();
        let result = open(&[0x43; KEY_SIZE], &sealed);
        assert!(matches!(result, Err(KeytierError::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_ciphertext() {
        let mut sealed = seal(&KEY, b"secret data").unwrap();
        sealed.ciphertext[3] ^= 0x01;
        assert!(matches!(
            open(&KEY, &sealed),
            Err(KeytierError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_every_tag_and_nonce_bit_is_authenticated() {
        let sealed = seal(&KEY, b"bit flips").unwrap();

        for bit in 0..TAG_SIZE * 8 {
            let mut tampered = sealed.clone();
            tampered.tag[bit / 8] ^= 1 << (bit % 8);
            assert!(open(&KEY, &tampered).is_err(), "tag bit {bit} not checked");
        }
        for bit in 0..NONCE_SIZE * 8 {
            let mut tampered = sealed.clone();
            tampered.nonce[bit / 8] ^= 1 << (bit % 8);
            assert!(open(&KEY, &tampered).is_err(), "nonce bit {bit} not checked");
        }
    }

    #[test]
    fn test_truncated_ciphertext() {
        let mut sealed = seal(&KEY, b"secret data").unwrap();
        sealed.ciphertext.pop();
        assert!(open(&KEY, &sealed).is_err());
    }
}
