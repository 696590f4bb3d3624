use std::path::PathBuf;

use thiserror::Error;

use crate::types::Tier;

pub type KeytierResult<T> = Result<T, KeytierError>;

#[derive(Debug, Error)]
pub enum KeytierError {
    /// Tag verification failed. Never accompanied by partial plaintext.
    #[error("authentication failed: wrong key or corrupted nonce, tag, or ciphertext")]
    AuthenticationFailed,

    #[error("malformed key record: {0}")]
    MalformedRecord(String),

    /// `source` carries the typed failure when the tier was rejected on load.
    #[error("{tier} key unavailable: {reason}")]
    KeyUnavailable {
        tier: Tier,
        reason: String,
        #[source]
        source: Option<Box<KeytierError>>,
    },

    #[error("key store I/O error on {}: {source}", path.display())]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("message decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("encryption failed: {0}")]
    Seal(String),

    #[error("{tier} key import rejected: {source}")]
    ImportRejected {
        tier: Tier,
        #[source]
        source: Box<KeytierError>,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl KeytierError {
    pub fn unavailable(tier: Tier, reason: impl Into<String>) -> Self {
        Self::KeyUnavailable {
            tier,
            reason: reason.into(),
            source: None,
        }
    }

    /// A tier that failed to load because of `cause`.
    pub fn unavailable_because(tier: Tier, context: &str, cause: KeytierError) -> Self {
        Self::KeyUnavailable {
            tier,
            reason: format!("{context}: {cause}"),
            source: Some(Box::new(cause)),
        }
    }

    pub fn store_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StoreIo {
            path: path.into(),
            source,
        }
    }
}

/// Causes of a failed message envelope decode.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("envelope is not valid base64: {0}")]
    OuterBase64(#[source] base64::DecodeError),

    #[error("envelope is not a valid JSON object: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field '{field}' is not valid base64: {source}")]
    FieldBase64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("field '{field}' must be {expected} bytes, got {actual}")]
    FieldLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("authentication failed: wrong key or tampered envelope")]
    Authentication,

    #[error("decrypted message is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
