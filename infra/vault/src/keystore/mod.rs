//! # Key Stores
//!
//! A [`KeyStore`] maps a [`KeyAlias`] to exactly one [`ProtectedKey`] for the lifetime
//! of the alias. Two backends are provided:
//!
//! * [`MemoryKeyStore`] keeps keys in process memory. Keys vanish with the process, so
//!   containers written with it are unreadable after a restart.
//! * [`FileKeyStore`] keeps one wrapped key per alias on disk, sealed under a key
//!   derived from a host master secret.

mod file;
mod memory;

pub use file::{FileKeyStore, FileKeyStoreBuilder, NoSecret, RECORD_LEN, WithSecret};
pub use memory::MemoryKeyStore;

use crate::error::VaultError;
use crate::key::{KeyAlias, ProtectedKey};
use std::fmt::Debug;
use std::sync::Arc;

/// Secure, internally synchronized storage for per-file keys.
///
/// `get_or_create` must be race-free: concurrent callers for one alias observe the
/// same key, and a key is never silently regenerated once it exists.
pub trait KeyStore: Send + Sync + Debug {
    /// Returns the key stored under `alias`, generating and persisting one if absent.
    fn get_or_create(&self, alias: &KeyAlias) -> Result<ProtectedKey, VaultError>;

    /// Deletes the key stored under `alias`. Deleting a missing alias succeeds.
    fn delete(&self, alias: &KeyAlias) -> Result<(), VaultError>;
}

impl<T: KeyStore + ?Sized> KeyStore for Arc<T> {
    fn get_or_create(&self, alias: &KeyAlias) -> Result<ProtectedKey, VaultError> {
        (**self).get_or_create(alias)
    }

    fn delete(&self, alias: &KeyAlias) -> Result<(), VaultError> {
        (**self).delete(alias)
    }
}
