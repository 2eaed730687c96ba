//! # Vault Catalog
//!
//! Tracks the files moved into the vault and hands out playback sources for them.
//! Containers live flat under the root as `<id>.wmv`, where `id` is the hex digest of
//! the key alias. `catalog.json` records, per container, the identity its key was
//! derived from; the containers themselves carry no identity.
//!
//! The codec is blocking, so every operation that touches a container runs on Tokio's
//! blocking pool.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wmp_vault::prelude::*;
//!
//! # async fn run() -> Result<(), VaultError> {
//! let catalog = VaultCatalog::builder()
//!     .root("/var/lib/wmp/vault")
//!     .keys(KeyManager::new(MemoryKeyStore::new()))
//!     .connect()
//!     .await?;
//!
//! let entry = catalog.move_into_vault("/home/me/Movies/clip.mp4").await?;
//! let mut source = catalog.open_for_playback(&entry).await?;
//! let declared = source.open(0, None)?;
//! # let _ = declared;
//! # Ok(())
//! # }
//! ```

mod builder;
mod index;
mod maintenance;

pub use builder::{NoKeys, NoRoot, VaultCatalogBuilder, WithKeys, WithRoot};

use crate::container::{self, OVERHEAD};
use crate::decoder::VaultSource;
use crate::encoder::{CancelFlag, VaultEncoder};
use crate::error::VaultError;
use crate::key::{KeyManager, PathIdentity};
use chrono::{DateTime, Utc};
use index::CatalogIndex;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// File extension of vault containers.
pub const CONTAINER_EXT: &str = "wmv";
/// Name of the catalog index inside the vault root.
pub const INDEX_FILE: &str = "catalog.json";

const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mkv", "webm", "avi", "mov"];

/// One file held in the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEntry {
    /// Container id: the hex digest of the key alias.
    pub id: String,
    /// Container location.
    pub path: PathBuf,
    /// Identity the key is bound to; the canonical path of the original file.
    pub identity: PathIdentity,
    pub original_name: String,
    pub added_at: DateTime<Utc>,
    /// Plaintext size in bytes.
    pub size: u64,
    pub is_video: bool,
}

/// Async front of the vault: moves files in, opens them for playback, removes them.
///
/// Cheap to clone; all clones share one index.
#[derive(Debug, Clone)]
pub struct VaultCatalog {
    inner: Arc<CatalogInner>,
}

#[derive(Debug)]
struct CatalogInner {
    root: PathBuf,
    keys: KeyManager,
    encoder: VaultEncoder,
    remove_source: bool,
    index: Mutex<CatalogIndex>,
}

impl VaultCatalog {
    #[must_use]
    pub fn builder() -> VaultCatalogBuilder {
        VaultCatalogBuilder::default()
    }

    /// Canonical vault root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Encrypts `file` into the vault and records it.
    ///
    /// Moving the same original again re-encodes it under the same key with a fresh
    /// nonce and replaces the previous container.
    ///
    /// If the index cannot be written, a newly created container is deleted again and
    /// the catalog is left as it was. For a re-move the new container stays in place
    /// under the previous record.
    ///
    /// # Errors
    /// * [`VaultError::SourceRead`] if the file cannot be resolved or read.
    /// * [`VaultError::KeyStoreUnavailable`] if the key cannot be obtained.
    /// * [`VaultError::DestinationWrite`] if the container or index cannot be written.
    pub async fn move_into_vault(&self, file: impl AsRef<Path>) -> Result<VaultEntry, VaultError> {
        self.move_into_vault_with_cancel(file, CancelFlag::new()).await
    }

    /// Like [`VaultCatalog::move_into_vault`], stopping with [`VaultError::Cancelled`]
    /// at the next chunk boundary once `cancel` is raised. A cancelled move leaves
    /// neither a container nor an index record.
    pub async fn move_into_vault_with_cancel(
        &self,
        file: impl AsRef<Path>,
        cancel: CancelFlag,
    ) -> Result<VaultEntry, VaultError> {
        let source = file.as_ref().to_path_buf();
        let inner = Arc::clone(&self.inner);
        run_blocking(move || inner.move_into_vault(&source, &cancel)).await
    }

    /// Opens a [`VaultSource`] for `entry`. Call [`VaultSource::open`] to start reading.
    ///
    /// The key is resolved with [`KeyManager::get_or_create_key`]. If the record for
    /// `entry` was lost from the key store, a new key is created here, full reads fail
    /// with [`VaultError::AuthenticationFailure`] and ranged reads return garbage.
    ///
    /// # Errors
    /// * [`VaultError::Io`] if the container is missing.
    /// * [`VaultError::ContainerFormat`] if it is not a valid container.
    /// * [`VaultError::KeyStoreUnavailable`] if the key cannot be obtained.
    pub async fn open_for_playback(&self, entry: &VaultEntry) -> Result<VaultSource, VaultError> {
        let entry = entry.clone();
        let inner = Arc::clone(&self.inner);
        run_blocking(move || {
            container::inspect(&entry.path)?;
            let key = inner.keys.get_or_create_key(&entry.identity)?;
            Ok(VaultSource::new(entry.path, &key))
        })
        .await
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<VaultEntry> {
        let mut entries: Vec<VaultEntry> = self.inner.index.lock().entries().cloned().collect();
        entries.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    #[must_use]
    pub fn entry(&self, id: &str) -> Option<VaultEntry> {
        self.inner.index.lock().get(id).cloned()
    }

    /// Destroys the key, deletes the container and drops the record, in that order.
    ///
    /// Each step tolerates having already been done, so a failed removal can simply be
    /// retried. The entry stays listed until the last step succeeds.
    ///
    /// # Errors
    /// * [`VaultError::Io`] if the container cannot be deleted.
    /// * [`VaultError::KeyStoreUnavailable`] if the key cannot be destroyed.
    /// * [`VaultError::DestinationWrite`] if the index cannot be written.
    pub async fn remove(&self, entry: &VaultEntry) -> Result<(), VaultError> {
        let entry = entry.clone();
        let inner = Arc::clone(&self.inner);
        run_blocking(move || inner.remove(&entry)).await
    }

    /// Removes temporary files abandoned by interrupted encodes.
    pub async fn purge_tmp(&self) {
        maintenance::purge_tmp(&self.inner.root).await;
    }
}

impl CatalogInner {
    fn move_into_vault(&self, source: &Path, cancel: &CancelFlag) -> Result<VaultEntry, VaultError> {
        let identity = PathIdentity::from_path(source)?;
        let original = PathBuf::from(identity.as_str());
        let id = identity.alias().digest().to_owned();
        let container = self.root.join(format!("{id}.{CONTAINER_EXT}"));

        let replacing = self.index.lock().get(&id).is_some();
        let key = self.keys.get_or_create_key(&identity)?;
        let written = self.encoder.encode_file(&original, &container, &key, cancel)?;

        let entry = VaultEntry {
            id,
            path: container,
            original_name: original
                .file_name()
                .map_or_else(|| identity.to_string(), |n| n.to_string_lossy().into_owned()),
            identity,
            added_at: Utc::now(),
            size: written - OVERHEAD,
            is_video: is_video(&original),
        };

        if let Err(err) = self.index.lock().insert(entry.clone()) {
            if !replacing {
                discard_container(&entry.path);
            }
            return Err(err);
        }

        if self.remove_source
            && let Err(err) = std::fs::remove_file(&original)
        {
            warn!(path = %original.display(), error = %err, "Failed to remove original after move");
        }

        info!(id = %entry.id, size = entry.size, video = entry.is_video, "Moved file into vault");
        Ok(entry)
    }

    fn remove(&self, entry: &VaultEntry) -> Result<(), VaultError> {
        self.keys.destroy_key(&entry.identity)?;

        match std::fs::remove_file(&entry.path) {
            Ok(()) => {},
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %entry.path.display(), "Container already gone");
            },
            Err(e) => {
                return Err(VaultError::io(e, format!("Failed to delete {}", entry.path.display())));
            },
        }

        self.index.lock().remove(&entry.id)?;

        info!(id = %entry.id, "Removed file from vault");
        Ok(())
    }
}

fn discard_container(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "Failed to discard unrecorded container");
    }
}

pub(crate) async fn run_blocking<T, F>(task: F) -> Result<T, VaultError>
where
    F: FnOnce() -> Result<T, VaultError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| VaultError::from(format!("Blocking vault task failed: {e}")))?
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.iter().any(|v| ext.eq_ignore_ascii_case(v)))
}
