//! Key lifecycle: deletion with regeneration, export and import of wrapped keys
//!
//! Import validates before it writes: a master record must open under the
//! root key, a user record under the incoming master (or the current one).
//! A rejected import leaves both the store and the in-memory keys untouched.

use keytier_core::{ExportBundle, KeySelection, KeytierError, KeytierResult, Tier, WrappedKeyRecord};
use keytier_crypto::{generate_key, root_key, unwrap_key, wrap_key, TierKey, KEY_SIZE};

use crate::hierarchy::{Keyring, TierState, Tiers};

struct ImportPlan {
    master: Option<(WrappedKeyRecord, TierKey)>,
    user: Option<(WrappedKeyRecord, TierKey)>,
}

impl Keyring {
    /// Delete the master key. The user key goes with it; both are
    /// regenerated and everything sealed under the old pair is lost.
    pub fn delete_master(&self) -> KeytierResult<()> {
        let mut tiers = self.tiers.write();
        tracing::info!("deleting master key (cascades to user key)");
        tiers.master = TierState::Absent;
        tiers.user = TierState::Absent;
        self.regenerate_master_locked(&mut tiers)
    }

    /// Delete the user key and regenerate it under the current master key.
    pub fn delete_user(&self) -> KeytierResult<()> {
        let mut tiers = self.tiers.write();
        tracing::info!("deleting user key");
        tiers.user = TierState::Absent;
        self.regenerate_user_locked(&mut tiers)
    }

    /// Same effect as [`Keyring::delete_master`].
    pub fn delete_both(&self) -> KeytierResult<()> {
        self.delete_master()
    }

    /// Stored wrapped records for out-of-band backup. Nothing is decrypted.
    pub fn export_wrapped(&self, selection: KeySelection) -> KeytierResult<ExportBundle> {
        let _tiers = self.tiers.read();

        let mut bundle = ExportBundle::default();
        for &tier in selection.tiers() {
            let record = self
                .store
                .read(tier)?
                .ok_or_else(|| KeytierError::unavailable(tier, "no wrapped record in the key store"))?;
            bundle.set(tier, record.to_base64());
        }

        tracing::info!(?selection, "wrapped keys exported");
        Ok(bundle)
    }

    /// Parse an export bundle document and import it.
    pub fn import_json(&self, text: &str) -> KeytierResult<()> {
        let bundle = ExportBundle::from_json(text)?;
        self.import_wrapped(&bundle)
    }

    /// Install wrapped records from an export bundle.
    ///
    /// Importing only a master record keeps the user key: the stored user
    /// record is kept if it opens under the incoming master, otherwise the
    /// loaded user key is re-wrapped under it.
    pub fn import_wrapped(&self, bundle: &ExportBundle) -> KeytierResult<()> {
        if bundle.is_empty() {
            return Err(KeytierError::MalformedRecord(
                "export bundle has neither master_key nor user_key".into(),
            ));
        }

        let mut tiers = self.tiers.write();
        let plan = self.plan_import(&tiers, bundle)?;
        self.apply_import(&mut tiers, plan)
    }

    fn plan_import(&self, tiers: &Tiers, bundle: &ExportBundle) -> KeytierResult<ImportPlan> {
        let master = bundle
            .get(Tier::Master)
            .map(|encoded| validate(Tier::Master, encoded, root_key()))
            .transpose()?;

        let user = match (bundle.get(Tier::User), &master) {
            (Some(encoded), Some((_, new_master))) => {
                Some(validate(Tier::User, encoded, new_master.as_bytes())?)
            }
            (Some(encoded), None) => {
                let current = tiers
                    .master
                    .require(Tier::Master)
                    .map_err(|e| rejected(Tier::User, e))?;
                Some(validate(Tier::User, encoded, current.as_bytes())?)
            }
            (None, Some((_, new_master))) => Some(self.carry_user_over(tiers, new_master)?),
            (None, None) => None,
        };

        Ok(ImportPlan { master, user })
    }

    fn carry_user_over(
        &self,
        tiers: &Tiers,
        new_master: &TierKey,
    ) -> KeytierResult<(WrappedKeyRecord, TierKey)> {
        match self.store.read(Tier::User) {
            Ok(Some(record)) => {
                if let Ok(key) = unwrap_key(new_master.as_bytes(), &record) {
                    return Ok((record, key));
                }
            }
            Ok(None) | Err(KeytierError::MalformedRecord(_)) => {}
            Err(e) => return Err(e),
        }

        let key = match &tiers.user {
            TierState::Loaded(key) => key.clone(),
            _ => {
                tracing::warn!("no usable user key to carry over; generating a new one");
                generate_key()
            }
        };
        let record = wrap_key(new_master.as_bytes(), &key)?;
        Ok((record, key))
    }

    fn apply_import(&self, tiers: &mut Tiers, plan: ImportPlan) -> KeytierResult<()> {
        let ImportPlan { master, user } = plan;

        if let Some((record, _)) = &master {
            self.store.write(Tier::Master, record)?;
        }
        if let Some((record, _)) = &user {
            if let Err(e) = self.store.write(Tier::User, record) {
                // master slot already replaced; the old in-memory pair no
                // longer matches the store
                if master.is_some() {
                    tiers.poison(&e);
                }
                return Err(e);
            }
        }

        let imported_master = master.is_some();
        let imported_user = user.is_some();
        if let Some((_, key)) = master {
            tiers.master = TierState::Loaded(key);
        }
        if let Some((_, key)) = user {
            tiers.user = TierState::Loaded(key);
        }

        tracing::info!(
            master = imported_master,
            user = imported_user,
            "wrapped keys imported"
        );
        Ok(())
    }
}

fn validate(
    tier: Tier,
    encoded: &str,
    parent: &[u8; KEY_SIZE],
) -> KeytierResult<(WrappedKeyRecord, TierKey)> {
    WrappedKeyRecord::from_base64(encoded)
        .and_then(|record| {
            let key = unwrap_key(parent, &record)?;
            Ok((record, key))
        })
        .map_err(|e| rejected(tier, e))
}

fn rejected(tier: Tier, source: KeytierError) -> KeytierError {
    tracing::warn!(tier = %tier, error = %source, "key import rejected");
    KeytierError::ImportRejected {
        tier,
        source: Box::new(source),
    }
}
