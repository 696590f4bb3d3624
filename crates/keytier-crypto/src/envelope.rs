//! Message envelope codec
//!
//! Envelope format (text):
//! ```text
//! base64( {"nonce": base64(12 bytes), "ciphertext": base64(N bytes), "tag": base64(16 bytes)} )
//! ```
//!
//! Unlike wrapped key records, each AEAD component is its own JSON field.
//! The empty string encodes and decodes to itself without touching the key.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use serde::{Deserialize, Serialize};

use keytier_core::{DecodeError, KeytierError, KeytierResult};

use crate::aead::{open, seal, Sealed};
use crate::keys::TierKey;

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeFields {
    nonce: String,
    ciphertext: String,
    tag: String,
}

/// Encrypt a UTF-8 message into an envelope string.
pub fn encode_message(key: &TierKey, plaintext: &str) -> KeytierResult<String> {
    if plaintext.is_empty() {
        return Ok(String::new());
    }

    let sealed = seal(key.as_bytes(), plaintext.as_bytes())?;
    let fields = EnvelopeFields {
        nonce: B64.encode(sealed.nonce),
        ciphertext: B64.encode(&sealed.ciphertext),
        tag: B64.encode(sealed.tag),
    };

    let json = serde_json::to_vec(&fields)
        .map_err(|e| KeytierError::Seal(format!("envelope serialization: {e}")))?;
    Ok(B64.encode(json))
}

/// Decrypt an envelope string back into the original message.
pub fn decode_message(key: &TierKey, envelope: &str) -> KeytierResult<String> {
    let envelope = envelope.trim();
    if envelope.is_empty() {
        return Ok(String::new());
    }

    let sealed = parse_envelope(envelope)?;
    let plaintext = open(key.as_bytes(), &sealed).map_err(|e| match e {
        KeytierError::AuthenticationFailed => KeytierError::Decode(DecodeError::Authentication),
        other => other,
    })?;

    String::from_utf8(plaintext).map_err(|e| KeytierError::Decode(DecodeError::Utf8(e)))
}

fn parse_envelope(envelope: &str) -> Result<Sealed, DecodeError> {
    let json = B64.decode(envelope).map_err(DecodeError::OuterBase64)?;
    let fields: EnvelopeFields = serde_json::from_slice(&json)?;

    let nonce = decode_field("nonce", &fields.nonce)?;
    let ciphertext = decode_field("ciphertext", &fields.ciphertext)?;
    let tag = decode_field("tag", &fields.tag)?;

    Ok(Sealed {
        nonce: fixed_len("nonce", &nonce)?,
        tag: fixed_len("tag", &tag)?,
        ciphertext,
    })
}

fn decode_field(field: &'static str, value: &str) -> Result<Vec<u8>, DecodeError> {
    B64.decode(value)
        .map_err(|source| DecodeError::FieldBase64 { field, source })
}

fn fixed_len<const N: usize>(field: &'static str, bytes: &[u8]) -> Result<[u8; N], DecodeError> {
    bytes.try_into().map_err(|_| DecodeError::FieldLength {
        field,
        expected: N,
        actual: bytes.len(),
    })
}
