//! keytier-crypto: AES-256-GCM sealing for the keytier key hierarchy
//!
//! Key hierarchy:
//! ```text
//! Root Key (256-bit, compiled in)
//!   └── Master Key (256-bit random, wrapped by root key)
//!       └── User Key (256-bit random, wrapped by master key)
//!           └── Message AEAD: AES-256-GCM (key=user_key, nonce=random_96bit)
//! ```
//!
//! Two wire formats share the same primitive:
//! - wrapped key record: `[12-byte nonce][16-byte tag][ciphertext]`, raw bytes
//! - message envelope: base64(JSON `{nonce, ciphertext, tag}`), each field base64

pub mod aead;
pub mod envelope;
pub mod keys;

pub use aead::{open, seal, Sealed};
pub use envelope::{decode_message, encode_message};
pub use keys::{generate_key, root_key, unwrap_key, wrap_key, TierKey};

/// Size of every key in the hierarchy (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag (128-bit)
pub const TAG_SIZE: usize = 16;
