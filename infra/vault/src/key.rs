//! Per-file key handles and the [`KeyManager`] that resolves them.

use crate::error::VaultError;
use crate::keystore::KeyStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Prefix of every key alias in the secure store.
pub const KEY_ALIAS_PREFIX: &str = "watermelon_vault_";

const FINGERPRINT_DOMAIN: &[u8] = b"wmp-key-fingerprint:v1";

/// A 256-bit AES key handle.
///
/// The key bytes are only reachable by the codec's cipher initialization inside this
/// crate. `Debug` is redacted and the material is wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ProtectedKey {
    material: [u8; KEY_LEN],
}

impl ProtectedKey {
    /// Generates a fresh key from the operating system CSPRNG.
    ///
    /// # Errors
    /// Returns [`VaultError::KeyStoreUnavailable`] if the system RNG fails; no weaker
    /// source is ever used instead.
    pub fn generate() -> Result<Self, VaultError> {
        let mut material = [0u8; KEY_LEN];
        getrandom::fill(&mut material).map_err(|e| {
            VaultError::key_store(format!("System RNG unavailable: {e}"), "generating key")
        })?;
        Ok(Self { material })
    }

    /// Wraps key material obtained from a platform key store.
    #[must_use]
    pub fn import(mut material: [u8; KEY_LEN]) -> Self {
        let key = Self { material };
        material.zeroize();
        key
    }

    /// A short, non-secret identifier of the key, suitable for logs and equality checks.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::new().chain_update(FINGERPRINT_DOMAIN).chain_update(self.material).finalize();
        hex::encode(&digest[..8])
    }

    pub(crate) const fn expose(&self) -> &[u8; KEY_LEN] {
        &self.material
    }
}

impl fmt::Debug for ProtectedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectedKey").field("material", &"<redacted>").finish()
    }
}

/// Stable identity of a protected source file, normally its canonical path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathIdentity(String);

impl PathIdentity {
    /// Builds the identity from an existing file by canonicalizing its path.
    ///
    /// Non UTF-8 path components are replaced lossily.
    ///
    /// # Errors
    /// Returns [`VaultError::SourceRead`] if the path cannot be resolved.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, VaultError> {
        let path = path.as_ref();
        let canonical = std::fs::canonicalize(path).map_err(|e| {
            VaultError::source_read(e, format!("Failed to resolve {}", path.display()))
        })?;
        Ok(Self(canonical.to_string_lossy().into_owned()))
    }

    /// Uses a caller-provided stable identity verbatim.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the key-store alias: the prefix followed by the SHA-256 of the identity.
    #[must_use]
    pub fn alias(&self) -> KeyAlias {
        KeyAlias { alias: format!("{KEY_ALIAS_PREFIX}{}", hex::encode(Sha256::digest(&self.0))) }
    }
}

impl fmt::Display for PathIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of one key inside the secure store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyAlias {
    alias: String,
}

impl KeyAlias {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.alias
    }

    /// The hex digest part of the alias, without the prefix.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.alias[KEY_ALIAS_PREFIX.len()..]
    }
}

impl fmt::Display for KeyAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.alias)
    }
}

/// Resolves one key per protected file through a [`KeyStore`].
///
/// Construct it once at startup and hand clones to the components that need it.
#[derive(Debug, Clone)]
pub struct KeyManager {
    store: Arc<dyn KeyStore>,
}

impl KeyManager {
    pub fn new(store: impl KeyStore + 'static) -> Self {
        Self { store: Arc::new(store) }
    }

    #[must_use]
    pub fn from_shared(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    /// Returns the key for `identity`, creating and persisting it on first use.
    ///
    /// # Errors
    /// Returns [`VaultError::KeyStoreUnavailable`] when the store cannot serve the alias.
    pub fn get_or_create_key(&self, identity: &PathIdentity) -> Result<ProtectedKey, VaultError> {
        let alias = identity.alias();
        let key = self.store.get_or_create(&alias)?;
        debug!(alias = %alias, fingerprint = %key.fingerprint(), "Key resolved");
        Ok(key)
    }

    /// Irrecoverably deletes the key for `identity`. Missing keys are not an error.
    ///
    /// # Errors
    /// Returns [`VaultError::KeyStoreUnavailable`] when the store cannot be modified.
    pub fn destroy_key(&self, identity: &PathIdentity) -> Result<(), VaultError> {
        let alias = identity.alias();
        self.store.delete(&alias)?;
        debug!(alias = %alias, "Key destroyed");
        Ok(())
    }
}
