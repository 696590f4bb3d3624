//! keytier-secrets: key store, key hierarchy, and lifecycle management
//!
//! A [`Keyring`] is the process-wide context: it owns the in-memory master
//! and user keys and serializes every key store mutation behind one lock.
//! Message encryption takes the lock shared; generation, deletion,
//! regeneration, and import take it exclusively.
//!
//! [`KeyService`] is the boundary consumed by the outer shell: every
//! operation returns a [`Response`] with a success flag and either a payload
//! or a human-readable error.

pub mod codec;
pub mod hierarchy;
pub mod lifecycle;
pub mod service;
pub mod store;

pub use hierarchy::{Keyring, KeyringStatus, TierStatus};
pub use service::{Body, KeyService, Response};
pub use store::{FileKeyStore, KeyStore, MemoryKeyStore};
