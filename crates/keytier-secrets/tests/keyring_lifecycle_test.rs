//! End-to-end keyring behaviour against an on-disk key store.
//!
//! Each test gets its own temp directory; nothing touches the real
//! configuration.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

use keytier_core::{ExportBundle, KeySelection, KeytierError, Tier};
use keytier_secrets::{FileKeyStore, KeyService, Keyring, TierStatus};

fn open_keyring(dir: &Path) -> Keyring {
    Keyring::open(FileKeyStore::in_dir(dir).unwrap()).unwrap()
}

fn slot(dir: &Path, tier: Tier) -> String {
    let name = match tier {
        Tier::Master => "master_key.json",
        Tier::User => "user_keys.json",
    };
    fs::read_to_string(dir.join(name)).unwrap()
}

#[test]
fn first_run_creates_both_slot_files() {
    let dir = tempfile::tempdir().unwrap();
    let keyring = open_keyring(dir.path());

    assert!(slot(dir.path(), Tier::Master).contains("\"master_key\""));
    assert!(slot(dir.path(), Tier::User).contains("\"user_key\""));
    assert_eq!(keyring.status().master, TierStatus::Loaded);
}

#[test]
fn hello_roundtrip_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let envelope = open_keyring(dir.path()).encrypt_message("hello").unwrap();

    let reopened = open_keyring(dir.path());
    assert_eq!(reopened.decrypt_message(&envelope).unwrap(), "hello");
}

#[test]
fn empty_message_maps_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let keyring = open_keyring(dir.path());
    assert_eq!(keyring.encrypt_message("").unwrap(), "");
    assert_eq!(keyring.decrypt_message("").unwrap(), "");
}

#[test]
fn corrupted_envelope_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let service = KeyService::new(Arc::new(open_keyring(dir.path())));

    let encrypted = service.encrypt("secret");
    let envelope = serde_json::to_value(&encrypted).unwrap()["encrypted"]
        .as_str()
        .unwrap()
        .to_string();

    // flip one character of the tag inside the decoded JSON, then re-encode
    use base64::Engine as _;
    let engine = base64::engine::general_purpose::STANDARD;
    let inner = engine.decode(&envelope).unwrap();
    let mut doc: serde_json::Value = serde_json::from_slice(&inner).unwrap();
    let tag = doc["tag"].as_str().unwrap().to_string();
    let flipped = if tag.starts_with('A') { "B" } else { "A" };
    doc["tag"] = serde_json::Value::String(format!("{flipped}{}", &tag[1..]));
    let tampered = engine.encode(serde_json::to_vec(&doc).unwrap());

    let response = service.decrypt(&tampered);
    assert!(!response.success);
    let json: serde_json::Value = serde_json::from_str(&response.to_json()).unwrap();
    assert!(json["error"].as_str().unwrap().contains("authentication"));
}

#[test]
fn delete_master_invalidates_old_envelopes() {
    let dir = tempfile::tempdir().unwrap();
    let keyring = open_keyring(dir.path());
    let envelope = keyring.encrypt_message("old").unwrap();
    let master_before = slot(dir.path(), Tier::Master);
    let user_before = slot(dir.path(), Tier::User);

    keyring.delete_master().unwrap();

    assert_ne!(slot(dir.path(), Tier::Master), master_before);
    assert_ne!(slot(dir.path(), Tier::User), user_before);
    assert!(keyring.decrypt_message(&envelope).is_err());

    // the regenerated pair is what a restart sees
    let fresh = keyring.encrypt_message("new").unwrap();
    assert_eq!(open_keyring(dir.path()).decrypt_message(&fresh).unwrap(), "new");
}

#[test]
fn delete_user_keeps_master_file() {
    let dir = tempfile::tempdir().unwrap();
    let keyring = open_keyring(dir.path());
    let envelope = keyring.encrypt_message("old").unwrap();
    let master_before = slot(dir.path(), Tier::Master);

    keyring.delete_user().unwrap();

    assert_eq!(slot(dir.path(), Tier::Master), master_before);
    assert!(keyring.decrypt_message(&envelope).is_err());
}

#[test]
fn export_user_then_import_restores_decryption() {
    let dir = tempfile::tempdir().unwrap();
    let keyring = open_keyring(dir.path());
    let envelope = keyring.encrypt_message("keep me").unwrap();

    let backup = keyring.export_wrapped(KeySelection::User).unwrap().to_json().unwrap();
    keyring.delete_user().unwrap();
    assert!(keyring.decrypt_message(&envelope).is_err());

    keyring.import_json(&backup).unwrap();
    assert_eq!(keyring.decrypt_message(&envelope).unwrap(), "keep me");
    assert_eq!(
        open_keyring(dir.path()).decrypt_message(&envelope).unwrap(),
        "keep me"
    );
}

#[test]
fn bad_import_is_rejected_and_state_survives() {
    let dir = tempfile::tempdir().unwrap();
    let keyring = open_keyring(dir.path());
    let envelope = keyring.encrypt_message("unchanged").unwrap();
    let user_before = slot(dir.path(), Tier::User);

    let bundle = ExportBundle {
        master_key: None,
        user_key: Some("bm90IGEga2V5".into()),
    };
    let err = keyring.import_wrapped(&bundle).unwrap_err();
    assert!(matches!(err, KeytierError::ImportRejected { tier: Tier::User, .. }));
    assert!(err.to_string().starts_with("user key import rejected"));

    assert_eq!(slot(dir.path(), Tier::User), user_before);
    assert_eq!(keyring.decrypt_message(&envelope).unwrap(), "unchanged");
}

#[test]
fn import_with_no_fields_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let keyring = open_keyring(dir.path());
    assert!(matches!(
        keyring.import_json("{}"),
        Err(KeytierError::MalformedRecord(_))
    ));
}

#[test]
fn concurrent_first_run_generates_one_hierarchy() {
    const THREADS: usize = 8;

    let dir = tempfile::tempdir().unwrap();
    let keyring = Arc::new(Keyring::new(FileKeyStore::in_dir(dir.path()).unwrap()));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let keyring = Arc::clone(&keyring);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                keyring.load().unwrap();
                let message = format!("thread {i}");
                let envelope = keyring.encrypt_message(&message).unwrap();
                (message, envelope)
            })
        })
        .collect();

    let sealed: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // every thread used the same user key, and it is the persisted one
    let reopened = open_keyring(dir.path());
    for (message, envelope) in &sealed {
        assert_eq!(&reopened.decrypt_message(envelope).unwrap(), message);
    }
    assert_eq!(
        keyring.current_user_key().unwrap().as_bytes(),
        reopened.current_user_key().unwrap().as_bytes()
    );
}
