//! Key hierarchy: root → master → user
//!
//! Each persisted tier moves through the same states:
//! ```text
//! Absent ──generate+wrap+write──▶ Loaded
//! Absent ──read+unwrap──────────▶ Loaded | Unavailable
//! Loaded ──delete/regenerate────▶ Absent ──▶ Loaded (fresh key)
//! ```
//! A freshly generated key is written to the store before it is reported
//! Loaded. The user tier can only load while the master tier is Loaded.

use std::fmt;

use parking_lot::RwLock;

use keytier_core::{KeytierError, KeytierResult, Tier};
use keytier_crypto::{generate_key, root_key, unwrap_key, wrap_key, TierKey, KEY_SIZE};

use crate::store::KeyStore;

/// Reported state of one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierStatus {
    Absent,
    Loaded,
    Unavailable(String),
}

impl fmt::Display for TierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierStatus::Absent => f.write_str("absent"),
            TierStatus::Loaded => f.write_str("loaded"),
            TierStatus::Unavailable(reason) => write!(f, "unavailable ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringStatus {
    pub master: TierStatus,
    pub user: TierStatus,
}

#[derive(Debug)]
pub(crate) enum TierState {
    Absent,
    Loaded(TierKey),
    Unavailable(String),
}

impl TierState {
    pub(crate) fn require(&self, tier: Tier) -> KeytierResult<&TierKey> {
        match self {
            TierState::Loaded(key) => Ok(key),
            TierState::Absent => Err(KeytierError::unavailable(tier, "not loaded")),
            TierState::Unavailable(reason) => Err(KeytierError::unavailable(tier, reason.clone())),
        }
    }

    fn is_loaded(&self) -> bool {
        matches!(self, TierState::Loaded(_))
    }

    fn status(&self) -> TierStatus {
        match self {
            TierState::Absent => TierStatus::Absent,
            TierState::Loaded(_) => TierStatus::Loaded,
            TierState::Unavailable(reason) => TierStatus::Unavailable(reason.clone()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Tiers {
    pub(crate) master: TierState,
    pub(crate) user: TierState,
}

impl Tiers {
    /// Mark both tiers unusable after a failed mutation; dropping the old
    /// keys zeroizes them.
    pub(crate) fn poison(&mut self, err: &KeytierError) {
        self.master = TierState::Unavailable(err.to_string());
        self.user = TierState::Unavailable(format!("master key unavailable: {err}"));
    }
}

/// The key hierarchy context: in-memory master/user keys plus their store.
///
/// All tier mutations and store writes happen under the write half of
/// `tiers`, so concurrent first-use loads generate exactly one key per tier.
pub struct Keyring {
    pub(crate) store: Box<dyn KeyStore>,
    pub(crate) tiers: RwLock<Tiers>,
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyring")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Keyring {
    /// Build an unloaded keyring; both tiers start Absent.
    pub fn new(store: impl KeyStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            tiers: RwLock::new(Tiers {
                master: TierState::Absent,
                user: TierState::Absent,
            }),
        }
    }

    /// Build a keyring and bring both tiers to Loaded.
    pub fn open(store: impl KeyStore + 'static) -> KeytierResult<Self> {
        let keyring = Self::new(store);
        keyring.load()?;
        Ok(keyring)
    }

    /// Load or generate every tier that is not yet Loaded. Idempotent.
    pub fn load(&self) -> KeytierResult<()> {
        let mut tiers = self.tiers.write();
        self.load_locked(&mut tiers)
    }

    pub fn status(&self) -> KeyringStatus {
        let tiers = self.tiers.read();
        KeyringStatus {
            master: tiers.master.status(),
            user: tiers.user.status(),
        }
    }

    /// Copy of the active user key.
    pub fn current_user_key(&self) -> KeytierResult<TierKey> {
        self.tiers.read().user.require(Tier::User).cloned()
    }

    /// Replace both keys: erase both slots, then generate and persist a new
    /// master key followed by a new user key. Everything sealed under the
    /// old keys becomes unrecoverable.
    pub fn regenerate_master(&self) -> KeytierResult<()> {
        let mut tiers = self.tiers.write();
        self.regenerate_master_locked(&mut tiers)
    }

    /// Replace the user key under the current master key.
    pub fn regenerate_user(&self) -> KeytierResult<()> {
        let mut tiers = self.tiers.write();
        self.regenerate_user_locked(&mut tiers)
    }

    pub(crate) fn load_locked(&self, tiers: &mut Tiers) -> KeytierResult<()> {
        if !tiers.master.is_loaded() {
            match self.load_or_generate(Tier::Master, root_key()) {
                Ok(key) => tiers.master = TierState::Loaded(key),
                Err(e) => {
                    tracing::warn!(tier = %Tier::Master, error = %e, "key hierarchy failed to load");
                    tiers.poison(&e);
                    return Err(e);
                }
            }
        }

        if !tiers.user.is_loaded() {
            let master = tiers.master.require(Tier::Master)?;
            match self.load_or_generate(Tier::User, master.as_bytes()) {
                Ok(key) => tiers.user = TierState::Loaded(key),
                Err(e) => {
                    tracing::warn!(tier = %Tier::User, error = %e, "key hierarchy failed to load");
                    tiers.user = TierState::Unavailable(e.to_string());
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    pub(crate) fn regenerate_master_locked(&self, tiers: &mut Tiers) -> KeytierResult<()> {
        let result = self.replace_master();
        match result {
            Ok((master, user)) => {
                tiers.master = TierState::Loaded(master);
                tiers.user = TierState::Loaded(user);
                tracing::info!("master and user keys regenerated");
                Ok(())
            }
            Err(e) => {
                tiers.poison(&e);
                Err(e)
            }
        }
    }

    pub(crate) fn regenerate_user_locked(&self, tiers: &mut Tiers) -> KeytierResult<()> {
        let master = tiers.master.require(Tier::Master).map_err(|e| {
            KeytierError::unavailable(Tier::User, format!("cannot regenerate without master: {e}"))
        })?;

        let result = self
            .store
            .erase(Tier::User)
            .and_then(|()| self.generate_and_persist(Tier::User, master.as_bytes()));
        match result {
            Ok(user) => {
                tiers.user = TierState::Loaded(user);
                tracing::info!("user key regenerated");
                Ok(())
            }
            Err(e) => {
                tiers.user = TierState::Unavailable(e.to_string());
                Err(e)
            }
        }
    }

    fn replace_master(&self) -> KeytierResult<(TierKey, TierKey)> {
        // User first: a master slot without a matching user slot is the
        // recoverable half-state.
        self.store.erase(Tier::User)?;
        self.store.erase(Tier::Master)?;

        let master = self.generate_and_persist(Tier::Master, root_key())?;
        let user = self.generate_and_persist(Tier::User, master.as_bytes())?;
        Ok((master, user))
    }

    fn load_or_generate(&self, tier: Tier, parent: &[u8; KEY_SIZE]) -> KeytierResult<TierKey> {
        match self.store.read(tier) {
            Ok(Some(record)) => {
                let key = unwrap_key(parent, &record).map_err(|e| {
                    KeytierError::unavailable_because(tier, "stored record rejected", e)
                })?;
                tracing::info!(tier = %tier, "key loaded from store");
                Ok(key)
            }
            Ok(None) => self.generate_and_persist(tier, parent),
            Err(e @ KeytierError::MalformedRecord(_)) => {
                Err(KeytierError::unavailable_because(tier, "slot document rejected", e))
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn generate_and_persist(
        &self,
        tier: Tier,
        parent: &[u8; KEY_SIZE],
    ) -> KeytierResult<TierKey> {
        let key = generate_key();
        let record = wrap_key(parent, &key)?;
        self.store.write(tier, &record)?;
        tracing::info!(tier = %tier, "generated and persisted new key");
        Ok(key)
    }
}
