use crate::container::{NONCE_LEN, TAG_LEN};
use crate::error::VaultError;
use crate::key::{KEY_LEN, KeyAlias, ProtectedKey};
use crate::keystore::KeyStore;
use crate::tmp::{self, TempPath};
use aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use parking_lot::Mutex;
use private::Sealed;
use sha2::Sha256;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const RECORD_VERSION: u8 = 1;
const RECORD_FLAGS: u8 = 0;
const RECORD_HEADER_LEN: usize = 2;
const KEY_FILE_EXT: &str = "key";
const WRAP_INFO: &[u8] = b"wmp-keystore:v1";

/// Size of one key record: `[version][flags][nonce][wrapped key][tag]`.
pub const RECORD_LEN: usize = RECORD_HEADER_LEN + NONCE_LEN + KEY_LEN + TAG_LEN;

#[derive(Debug, Default)]
pub struct NoSecret;

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct WithSecret {
    wrapping: [u8; KEY_LEN],
}

impl fmt::Debug for WithSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithSecret").field("wrapping", &"<redacted>").finish()
    }
}

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoSecret {}
impl Sealed for WithSecret {}

/// A builder for a [`FileKeyStore`].
///
/// The derived wrapping key lives in the builder only until [`FileKeyStoreBuilder::open`]
/// and is wiped when the builder is dropped.
#[allow(private_bounds)]
#[derive(Debug)]
pub struct FileKeyStoreBuilder<S: Sealed = NoSecret> {
    root: PathBuf,
    create: bool,
    state: S,
}

#[allow(private_bounds)]
impl<S: Sealed> FileKeyStoreBuilder<S> {
    /// Whether a missing root directory is created on open. Enabled by default.
    #[must_use]
    pub const fn create(mut self, enable: bool) -> Self {
        self.create = enable;
        self
    }
}

impl FileKeyStoreBuilder<NoSecret> {
    /// Derives the wrapping key with HKDF-SHA256 from the host master secret.
    ///
    /// # Errors
    /// Returns [`VaultError::KeyStoreUnavailable`] for an empty secret.
    pub fn master_secret(
        self,
        secret: impl AsRef<[u8]>,
        salt: impl AsRef<[u8]>,
    ) -> Result<FileKeyStoreBuilder<WithSecret>, VaultError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(VaultError::key_store("Master secret must not be empty", "deriving wrapping key"));
        }

        let (_, hk) = Hkdf::<Sha256>::extract(Some(salt.as_ref()), secret);
        let mut state = WithSecret { wrapping: [0u8; KEY_LEN] };
        hk.expand(WRAP_INFO, &mut state.wrapping)
            .map_err(|_| VaultError::key_store("HKDF expansion failed", "deriving wrapping key"))?;

        Ok(FileKeyStoreBuilder { root: self.root, create: self.create, state })
    }
}

impl FileKeyStoreBuilder<WithSecret> {
    /// Opens the store: creates and resolves the root and purges abandoned temporary
    /// records.
    ///
    /// # Errors
    /// Returns [`VaultError::KeyStoreUnavailable`] if the root cannot be created or
    /// resolved.
    pub fn open(self) -> Result<FileKeyStore, VaultError> {
        let unavailable = |e: io::Error| {
            VaultError::key_store(e.to_string(), format!("opening {}", self.root.display()))
        };

        if self.create {
            fs::create_dir_all(&self.root).map_err(unavailable)?;
        }
        let root = fs::canonicalize(&self.root).map_err(unavailable)?;
        if !root.is_dir() {
            return Err(VaultError::key_store(
                "Key store root is not a directory",
                root.display().to_string(),
            ));
        }

        let wrapper = Aes256Gcm::new_from_slice(&self.state.wrapping)
            .map_err(|_| VaultError::key_store("Invalid wrapping key length", "opening key store"))?;

        let (removed, failed) = tmp::remove_stale(&root, SystemTime::now(), tmp::STALE_AFTER);
        if removed > 0 || failed > 0 {
            debug!(removed, failed, "Purged temporary key records");
        }

        info!(path = %root.display(), "Opened file key store");
        Ok(FileKeyStore { root, wrapper, lock: Mutex::new(()) })
    }
}

/// Key store keeping one wrapped key per alias in `<root>/<alias>.key`.
///
/// Each record is sealed with AES-256-GCM under the wrapping key, with the alias as
/// associated data, so a record copied or renamed to another alias does not open.
/// Records are created through a synced temporary file that is hard-linked into place,
/// which never overwrites a record another process created first. The root must be on
/// a filesystem that supports hard links.
pub struct FileKeyStore {
    root: PathBuf,
    wrapper: Aes256Gcm,
    lock: Mutex<()>,
}

impl fmt::Debug for FileKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileKeyStore").field("root", &self.root).finish_non_exhaustive()
    }
}

impl FileKeyStore {
    #[must_use]
    pub fn builder(root: impl Into<PathBuf>) -> FileKeyStoreBuilder {
        FileKeyStoreBuilder { root: root.into(), create: true, state: NoSecret }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if a record for `alias` exists. The record is not authenticated.
    #[must_use]
    pub fn contains(&self, alias: &KeyAlias) -> bool {
        self.record_path(alias).is_file()
    }

    /// Path of the record file for `alias`.
    #[must_use]
    pub fn record_path(&self, alias: &KeyAlias) -> PathBuf {
        self.root.join(format!("{alias}.{KEY_FILE_EXT}"))
    }

    fn load(&self, alias: &KeyAlias, path: &Path) -> Result<Option<ProtectedKey>, VaultError> {
        match fs::read(path) {
            Ok(record) => self.unseal(alias, &record).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::key_store(
                format!("Failed to read key record: {e}"),
                alias.to_string(),
            )),
        }
    }

    fn seal(&self, alias: &KeyAlias, key: &ProtectedKey) -> Result<[u8; RECORD_LEN], VaultError> {
        let mut nonce = [0u8; NONCE_LEN];
        getrandom::fill(&mut nonce).map_err(|e| {
            VaultError::key_store(format!("System RNG unavailable: {e}"), alias.to_string())
        })?;

        let payload = Payload { msg: key.expose(), aad: alias.as_str().as_bytes() };
        let sealed = self
            .wrapper
            .encrypt(Nonce::from_slice(&nonce), payload)
            .map_err(|_| VaultError::key_store("Key wrapping failed", alias.to_string()))?;

        let mut record = [0u8; RECORD_LEN];
        record[0] = RECORD_VERSION;
        record[1] = RECORD_FLAGS;
        record[RECORD_HEADER_LEN..RECORD_HEADER_LEN + NONCE_LEN].copy_from_slice(&nonce);
        record[RECORD_HEADER_LEN + NONCE_LEN..].copy_from_slice(&sealed);
        Ok(record)
    }

    fn unseal(&self, alias: &KeyAlias, record: &[u8]) -> Result<ProtectedKey, VaultError> {
        if record.len() != RECORD_LEN {
            return Err(VaultError::key_store(
                format!("Key record has invalid length {}", record.len()),
                alias.to_string(),
            ));
        }
        if record[0] != RECORD_VERSION || record[1] != RECORD_FLAGS {
            return Err(VaultError::key_store(
                format!("Unsupported key record version {} flags {}", record[0], record[1]),
                alias.to_string(),
            ));
        }

        let (nonce, sealed) = record[RECORD_HEADER_LEN..].split_at(NONCE_LEN);
        let payload = Payload { msg: sealed, aad: alias.as_str().as_bytes() };
        let plain = Zeroizing::new(
            self.wrapper.decrypt(Nonce::from_slice(nonce), payload).map_err(|_| {
                VaultError::key_store("Key record failed authentication", alias.to_string())
            })?,
        );

        let material: [u8; KEY_LEN] = plain.as_slice().try_into().map_err(|_| {
            VaultError::key_store("Unwrapped key has invalid length", alias.to_string())
        })?;
        Ok(ProtectedKey::import(material))
    }

    fn store(&self, path: &Path, record: &[u8]) -> io::Result<()> {
        let temp = TempPath::for_target(path);
        {
            let mut file = temp.create()?;
            file.write_all(record)?;
            file.sync_all()?;
        }
        temp.persist_noclobber(path)?;
        tmp::sync_dir(&self.root);
        Ok(())
    }
}

impl KeyStore for FileKeyStore {
    fn get_or_create(&self, alias: &KeyAlias) -> Result<ProtectedKey, VaultError> {
        let _guard = self.lock.lock();
        let path = self.record_path(alias);

        if let Some(key) = self.load(alias, &path)? {
            return Ok(key);
        }

        let key = ProtectedKey::generate()?;
        let record = self.seal(alias, &key)?;

        match self.store(&path, &record) {
            Ok(()) => {
                info!(alias = %alias, "Created key record");
                Ok(key)
            },
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(alias = %alias, "Key record created concurrently, loading it");
                self.load(alias, &path)?.ok_or_else(|| {
                    VaultError::key_store("Key record vanished during creation", alias.to_string())
                })
            },
            Err(e) => Err(VaultError::key_store(
                format!("Failed to persist key record: {e}"),
                alias.to_string(),
            )),
        }
    }

    fn delete(&self, alias: &KeyAlias) -> Result<(), VaultError> {
        let _guard = self.lock.lock();
        match fs::remove_file(self.record_path(alias)) {
            Ok(()) => {
                tmp::sync_dir(&self.root);
                info!(alias = %alias, "Deleted key record");
                Ok(())
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::key_store(
                format!("Failed to delete key record: {e}"),
                alias.to_string(),
            )),
        }
    }
}
