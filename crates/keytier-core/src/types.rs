use std::fmt;

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{KeytierError, KeytierResult};

/// A persisted tier of the key hierarchy. The root tier is compiled in and
/// has no slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Master,
    User,
}

impl Tier {
    /// Slot name in the key store.
    pub fn slot(self) -> &'static str {
        match self {
            Tier::Master => "master",
            Tier::User => "user",
        }
    }

    /// JSON field carrying this tier's wrapped record in slot documents and
    /// export bundles.
    pub fn field(self) -> &'static str {
        match self {
            Tier::Master => "master_key",
            Tier::User => "user_key",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slot())
    }
}

/// Which tiers an export covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySelection {
    Master,
    User,
    Both,
}

impl KeySelection {
    pub fn tiers(self) -> &'static [Tier] {
        match self {
            KeySelection::Master => &[Tier::Master],
            KeySelection::User => &[Tier::User],
            KeySelection::Both => &[Tier::Master, Tier::User],
        }
    }
}

/// Opaque wrapped key bytes: `nonce(12) || tag(16) || ciphertext`.
///
/// The store only moves these bytes around; parsing the layout is the
/// crypto crate's job.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKeyRecord(Vec<u8>);

impl WrappedKeyRecord {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_base64(encoded: &str) -> KeytierResult<Self> {
        B64.decode(encoded.trim())
            .map(Self)
            .map_err(|e| KeytierError::MalformedRecord(format!("invalid base64: {e}")))
    }

    pub fn to_base64(&self) -> String {
        B64.encode(&self.0)
    }
}

impl fmt::Debug for WrappedKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedKeyRecord")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Backup/restore exchange document: `{"master_key": "...", "user_key": "..."}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_key: Option<String>,
}

impl ExportBundle {
    pub fn get(&self, tier: Tier) -> Option<&str> {
        match tier {
            Tier::Master => self.master_key.as_deref(),
            Tier::User => self.user_key.as_deref(),
        }
    }

    pub fn set(&mut self, tier: Tier, encoded: String) {
        match tier {
            Tier::Master => self.master_key = Some(encoded),
            Tier::User => self.user_key = Some(encoded),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.master_key.is_none() && self.user_key.is_none()
    }

    pub fn to_json(&self) -> KeytierResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| KeytierError::MalformedRecord(format!("serializing export bundle: {e}")))
    }

    pub fn from_json(text: &str) -> KeytierResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| KeytierError::MalformedRecord(format!("parsing export bundle: {e}")))
    }
}
