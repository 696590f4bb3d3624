//! Message encryption under the active user key.
//!
//! Both operations hold the keyring lock shared, so they run in parallel
//! with each other and never overlap a lifecycle mutation.

use keytier_core::{KeytierResult, Tier};
use keytier_crypto::{decode_message, encode_message};

use crate::hierarchy::Keyring;

impl Keyring {
    /// Encrypt a message into an envelope string. `""` maps to `""`.
    pub fn encrypt_message(&self, plaintext: &str) -> KeytierResult<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let tiers = self.tiers.read();
        encode_message(tiers.user.require(Tier::User)?, plaintext)
    }

    /// Decrypt an envelope string. `""` maps to `""`.
    pub fn decrypt_message(&self, envelope: &str) -> KeytierResult<String> {
        if envelope.trim().is_empty() {
            return Ok(String::new());
        }
        let tiers = self.tiers.read();
        decode_message(tiers.user.require(Tier::User)?, envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::faulty::FaultyStore;
    use crate::store::MemoryKeyStore;
    use keytier_core::{DecodeError, KeytierError};

    #[test]
    fn test_encrypt_decrypt_hello() {
        let keyring = Keyring::open(MemoryKeyStore::new()).unwrap();
        let envelope = keyring.encrypt_message("hello").unwrap();
        assert_eq!(keyring.decrypt_message(&envelope).unwrap(), "hello");
    }

    #[test]
    fn test_empty_needs_no_key() {
        let keyring = Keyring::new(MemoryKeyStore::new());
        assert_eq!(keyring.encrypt_message("").unwrap(), "");
        assert_eq!(keyring.decrypt_message("").unwrap(), "");
    }

    #[test]
    fn test_unloaded_keyring_refuses() {
        let keyring = Keyring::new(MemoryKeyStore::new());
        assert!(matches!(
            keyring.encrypt_message("hi"),
            Err(KeytierError::KeyUnavailable { tier: Tier::User, .. })
        ));
    }

    #[test]
    fn test_other_keyring_cannot_decrypt() {
        let a = Keyring::open(MemoryKeyStore::new()).unwrap();
        let b = Keyring::open(MemoryKeyStore::new()).unwrap();

        let envelope = a.encrypt_message("for a only").unwrap();
        assert!(matches!(
            b.decrypt_message(&envelope),
            Err(KeytierError::Decode(DecodeError::Authentication))
        ));
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(64))]

        #[test]
        fn prop_envelopes_survive_reopen(message in "\\PC{0,200}") {
            let store = FaultyStore::default();
            let first = Keyring::open(store.clone()).unwrap();
            let envelope = first.encrypt_message(&message).unwrap();

            let second = Keyring::open(store).unwrap();
            proptest::prop_assert_eq!(second.decrypt_message(&envelope).unwrap(), message);
        }
    }
}
