use crate::catalog::{CatalogInner, INDEX_FILE, VaultCatalog, maintenance, run_blocking};
use crate::catalog::index::CatalogIndex;
use crate::encoder::{DEFAULT_CHUNK_SIZE, VaultEncoder};
use crate::error::VaultError;
use crate::key::KeyManager;
use parking_lot::Mutex;
use private::Sealed;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::info;

#[derive(Debug, Clone)]
struct CatalogConfig {
    chunk_size: usize,
    remove_source: bool,
    create: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, remove_source: false, create: true }
    }
}

#[derive(Debug, Default)]
pub struct NoRoot;
#[derive(Debug)]
pub struct WithRoot(PathBuf);
#[derive(Debug, Default)]
pub struct NoKeys;
#[derive(Debug)]
pub struct WithKeys(KeyManager);

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoRoot {}
impl Sealed for WithRoot {}
impl Sealed for NoKeys {}
impl Sealed for WithKeys {}

#[allow(private_bounds)]
#[derive(Debug, Default)]
pub struct VaultCatalogBuilder<R: Sealed = NoRoot, K: Sealed = NoKeys> {
    root: R,
    keys: K,
    config: CatalogConfig,
}

#[allow(private_bounds)]
impl<R: Sealed, K: Sealed> VaultCatalogBuilder<R, K> {
    /// Plaintext bytes processed per chunk when encoding.
    #[must_use]
    pub const fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    /// Deletes the plaintext original after a successful move. Disabled by default.
    #[must_use]
    pub const fn remove_source(mut self, enable: bool) -> Self {
        self.config.remove_source = enable;
        self
    }

    /// Whether a missing root directory is created on connect. Enabled by default.
    #[must_use]
    pub const fn create(mut self, enable: bool) -> Self {
        self.config.create = enable;
        self
    }
}

#[allow(private_bounds)]
impl<K: Sealed> VaultCatalogBuilder<NoRoot, K> {
    #[must_use]
    pub fn root(self, path: impl Into<PathBuf>) -> VaultCatalogBuilder<WithRoot, K> {
        VaultCatalogBuilder { root: WithRoot(path.into()), keys: self.keys, config: self.config }
    }
}

#[allow(private_bounds)]
impl<R: Sealed> VaultCatalogBuilder<R, NoKeys> {
    #[must_use]
    pub fn keys(self, keys: KeyManager) -> VaultCatalogBuilder<R, WithKeys> {
        VaultCatalogBuilder { root: self.root, keys: WithKeys(keys), config: self.config }
    }
}

impl VaultCatalogBuilder<WithRoot, WithKeys> {
    /// Opens the catalog.
    ///
    /// 1. Creates the root directory when `create(true)` is set.
    /// 2. Resolves the root to its canonical path.
    /// 3. Loads `catalog.json`, treating a missing file as an empty vault.
    /// 4. Purges temporary files abandoned by interrupted encodes. Failures here are
    ///    logged and do not stop the catalog from opening.
    ///
    /// # Errors
    /// Returns [`VaultError::Io`] if the root cannot be created or resolved, or the
    /// index cannot be read or parsed.
    pub async fn connect(self) -> Result<VaultCatalog, VaultError> {
        let root = &self.root.0;

        if self.config.create {
            fs::create_dir_all(root).await.map_err(|e| {
                VaultError::io(e, format!("Failed to bootstrap vault root: {}", root.display()))
            })?;
        }

        let canonical = fs::canonicalize(root).await.map_err(|e| {
            VaultError::io(e, format!("Failed to resolve vault root: {}", root.display()))
        })?;

        let index_path = canonical.join(INDEX_FILE);
        let index = run_blocking(move || CatalogIndex::load(index_path)).await?;

        maintenance::purge_tmp(&canonical).await;

        info!(path = %canonical.display(), "Opened vault catalog");
        Ok(VaultCatalog {
            inner: Arc::new(CatalogInner {
                root: canonical,
                keys: self.keys.0,
                encoder: VaultEncoder::with_chunk_size(self.config.chunk_size),
                remove_source: self.config.remove_source,
                index: Mutex::new(index),
            }),
        })
    }
}
