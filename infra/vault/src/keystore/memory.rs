use crate::error::VaultError;
use crate::key::{KeyAlias, ProtectedKey};
use crate::keystore::KeyStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::info;

/// Process-local key store.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, ProtectedKey>>,
}

impl MemoryKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, alias: &KeyAlias) -> bool {
        self.keys.lock().contains_key(alias.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }
}

impl KeyStore for MemoryKeyStore {
    fn get_or_create(&self, alias: &KeyAlias) -> Result<ProtectedKey, VaultError> {
        let mut keys = self.keys.lock();
        if let Some(key) = keys.get(alias.as_str()) {
            return Ok(key.clone());
        }

        let key = ProtectedKey::generate()?;
        keys.insert(alias.as_str().to_owned(), key.clone());
        info!(alias = %alias, "Created in-memory key");
        Ok(key)
    }

    fn delete(&self, alias: &KeyAlias) -> Result<(), VaultError> {
        self.keys.lock().remove(alias.as_str());
        Ok(())
    }
}
