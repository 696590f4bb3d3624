//! Key material and key wrapping between adjacent tiers

use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use keytier_core::{KeytierError, KeytierResult, WrappedKeyRecord};

use crate::aead::{open, seal, Sealed};
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Root wrapping key. Every persisted master record is sealed under it, so
/// changing these bytes orphans existing key stores.
static ROOT_KEY: [u8; KEY_SIZE] = [
    0xa3, 0x5e, 0x1f, 0x8c, 0x92, 0x47, 0xda, 0x0b, 0x34, 0xe7, 0x8a, 0x90, 0xbc, 0xfe, 0x01, 0x28,
    0x9d, 0x76, 0x12, 0xab, 0x5c, 0xcf, 0x66, 0x2d, 0xf0, 0x11, 0xb9, 0x3e, 0x87, 0x64, 0x09, 0xaa,
];

pub fn root_key() -> &'static [u8; KEY_SIZE] {
    &ROOT_KEY
}

/// A 256-bit master or user key. Zeroized on drop.
#[derive(Clone)]
pub struct TierKey {
    bytes: [u8; KEY_SIZE],
}

impl TierKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for TierKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for TierKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit key.
pub fn generate_key() -> TierKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    TierKey::from_bytes(bytes)
}

/// Wrap (encrypt) a key under its parent tier's key.
///
/// Output: `[12-byte nonce][16-byte tag][ciphertext]`
pub fn wrap_key(parent: &[u8; KEY_SIZE], key: &TierKey) -> KeytierResult<WrappedKeyRecord> {
    let sealed = seal(parent, key.as_bytes())?;

    let mut bytes = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + sealed.ciphertext.len());
    bytes.extend_from_slice(&sealed.nonce);
    bytes.extend_from_slice(&sealed.tag);
    bytes.extend_from_slice(&sealed.ciphertext);
    Ok(WrappedKeyRecord::from_bytes(bytes))
}

/// Unwrap (decrypt) a key record with its parent tier's key.
pub fn unwrap_key(parent: &[u8; KEY_SIZE], record: &WrappedKeyRecord) -> KeytierResult<TierKey> {
    let sealed = split_record(record.as_bytes())?;
    let plaintext = Zeroizing::new(open(parent, &sealed)?);

    if plaintext.len() != KEY_SIZE {
        return Err(KeytierError::MalformedRecord(format!(
            "unwrapped key has wrong size: {} bytes (expected {KEY_SIZE})",
            plaintext.len()
        )));
    }

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    Ok(TierKey::from_bytes(key_bytes))
}

fn split_record(bytes: &[u8]) -> KeytierResult<Sealed> {
    if bytes.len() < NONCE_SIZE + TAG_SIZE {
        return Err(KeytierError::MalformedRecord(format!(
            "wrapped key too short: {} bytes (expected at least {})",
            bytes.len(),
            NONCE_SIZE + TAG_SIZE
        )));
    }

    let (nonce, rest) = bytes.split_at(NONCE_SIZE);
    let (tag, ciphertext) = rest.split_at(TAG_SIZE);

    let mut sealed = Sealed {
        nonce: [0u8; NONCE_SIZE],
        tag: [0u8; TAG_SIZE],
        ciphertext: ciphertext.to_vec(),
    };
    sealed.nonce.copy_from_slice(nonce);
    sealed.tag.copy_from_slice(tag);
    Ok(sealed)
}
