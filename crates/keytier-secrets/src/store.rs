//! Key store: persists wrapped key records, one JSON document per slot
//!
//! Slot document format:
//! ```json
//! {
//!   "master_key": "<base64 of nonce(12) || tag(16) || ciphertext>"
//! }
//! ```
//!
//! The store never interprets the record bytes.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use keytier_core::config::StoreConfig;
use keytier_core::{KeytierError, KeytierResult, Tier, WrappedKeyRecord};

/// Storage for the two wrapped-key slots.
pub trait KeyStore: Send + Sync {
    /// Load a slot's record; `Ok(None)` when the slot is empty.
    fn read(&self, tier: Tier) -> KeytierResult<Option<WrappedKeyRecord>>;

    /// Replace a slot's record. Readers never observe a partial document.
    fn write(&self, tier: Tier, record: &WrappedKeyRecord) -> KeytierResult<()>;

    /// Empty a slot. Erasing an empty slot succeeds.
    fn erase(&self, tier: Tier) -> KeytierResult<()>;
}

fn render_document(tier: Tier, record: &WrappedKeyRecord) -> KeytierResult<String> {
    let doc = BTreeMap::from([(tier.field(), record.to_base64())]);
    serde_json::to_string_pretty(&doc)
        .map_err(|e| KeytierError::MalformedRecord(format!("serializing {tier} slot: {e}")))
}

fn parse_document(tier: Tier, text: &str) -> KeytierResult<WrappedKeyRecord> {
    let doc: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| KeytierError::MalformedRecord(format!("{tier} slot is not valid JSON: {e}")))?;

    let encoded = doc
        .get(tier.field())
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| {
            KeytierError::MalformedRecord(format!(
                "{tier} slot has no '{}' string field",
                tier.field()
            ))
        })?;

    WrappedKeyRecord::from_base64(encoded)
}

// ── File-backed store ─────────────────────────────────────────────────────────

/// Slot documents on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    master_path: PathBuf,
    user_path: PathBuf,
}

impl FileKeyStore {
    /// Open the store described by `config`, creating its directory.
    pub fn open(config: &StoreConfig) -> KeytierResult<Self> {
        fs::create_dir_all(&config.dir).map_err(|e| KeytierError::store_io(&config.dir, e))?;

        Ok(Self {
            master_path: config.slot_path(Tier::Master),
            user_path: config.slot_path(Tier::User),
        })
    }

    /// Open a store in `dir` with the default slot file names.
    pub fn in_dir(dir: impl Into<PathBuf>) -> KeytierResult<Self> {
        Self::open(&StoreConfig {
            dir: dir.into(),
            ..StoreConfig::default()
        })
    }

    pub fn path(&self, tier: Tier) -> &Path {
        match tier {
            Tier::Master => &self.master_path,
            Tier::User => &self.user_path,
        }
    }
}

impl KeyStore for FileKeyStore {
    fn read(&self, tier: Tier) -> KeytierResult<Option<WrappedKeyRecord>> {
        let path = self.path(tier);
        match fs::read_to_string(path) {
            Ok(text) => parse_document(tier, &text).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(slot = %tier, path = %path.display(), "slot empty");
                Ok(None)
            }
            Err(e) => Err(KeytierError::store_io(path, e)),
        }
    }

    fn write(&self, tier: Tier, record: &WrappedKeyRecord) -> KeytierResult<()> {
        let document = render_document(tier, record)?;
        atomic_replace(self.path(tier), &document)
    }

    fn erase(&self, tier: Tier) -> KeytierResult<()> {
        let path = self.path(tier);
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!(slot = %tier, path = %path.display(), "slot erased");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KeytierError::store_io(path, e)),
        }
    }
}

/// Atomically replace a file with new content.
///
/// Writes to a temp file in the same directory, then renames over the
/// target so concurrent readers see either the old or the new document.
fn atomic_replace(path: &Path, content: &str) -> KeytierResult<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    let written = write_private(&tmp_path, content.as_bytes()).and_then(|()| fs::rename(&tmp_path, path));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(KeytierError::store_io(path, e));
    }

    tracing::debug!(path = %path.display(), "slot document replaced");
    Ok(())
}

fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// ── In-memory store ───────────────────────────────────────────────────────────

/// Slot documents held in memory, encoded exactly as the file store does.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    slots: Mutex<HashMap<Tier, String>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw slot document, if any.
    pub fn document(&self, tier: Tier) -> Option<String> {
        self.slots.lock().get(&tier).cloned()
    }

    /// Store a raw document without validation.
    pub fn put_document(&self, tier: Tier, document: impl Into<String>) {
        self.slots.lock().insert(tier, document.into());
    }
}

impl KeyStore for MemoryKeyStore {
    fn read(&self, tier: Tier) -> KeytierResult<Option<WrappedKeyRecord>> {
        self.slots
            .lock()
            .get(&tier)
            .map(|doc| parse_document(tier, doc))
            .transpose()
    }

    fn write(&self, tier: Tier, record: &WrappedKeyRecord) -> KeytierResult<()> {
        let document = render_document(tier, record)?;
        self.slots.lock().insert(tier, document);
        Ok(())
    }

    fn erase(&self, tier: Tier) -> KeytierResult<()> {
        self.slots.lock().remove(&tier);
        Ok(())
    }
}
