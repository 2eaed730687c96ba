use crate::catalog::VaultEntry;
use crate::error::VaultError;
use crate::tmp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use tracing::debug;

const INDEX_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    entries: Vec<VaultEntry>,
}

/// The persisted list of vault members, keyed by container id.
#[derive(Debug)]
pub(crate) struct CatalogIndex {
    path: PathBuf,
    entries: BTreeMap<String, VaultEntry>,
}

impl CatalogIndex {
    pub(crate) fn load(path: PathBuf) -> Result<Self, VaultError> {
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No catalog index yet");
                return Ok(Self { path, entries: BTreeMap::new() });
            },
            Err(e) => {
                return Err(VaultError::io(e, format!("Failed to read {}", path.display())));
            },
        };

        let file: IndexFile = serde_json::from_slice(&bytes).map_err(|e| {
            VaultError::io(e.into(), format!("Failed to parse {}", path.display()))
        })?;
        if file.version != INDEX_VERSION {
            return Err(VaultError::Io {
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unsupported catalog version {}", file.version),
                ),
                context: Some(path.display().to_string().into()),
            });
        }

        let entries = file.entries.into_iter().map(|e| (e.id.clone(), e)).collect();
        Ok(Self { path, entries })
    }

    pub(crate) fn get(&self, id: &str) -> Option<&VaultEntry> {
        self.entries.get(id)
    }

    /// Adds or replaces `entry`. Memory only changes once the new index is on disk.
    pub(crate) fn insert(&mut self, entry: VaultEntry) -> Result<Option<VaultEntry>, VaultError> {
        let mut next = self.entries.clone();
        let previous = next.insert(entry.id.clone(), entry);
        self.commit(next)?;
        Ok(previous)
    }

    /// Drops the record for `id`. Memory only changes once the new index is on disk.
    pub(crate) fn remove(&mut self, id: &str) -> Result<Option<VaultEntry>, VaultError> {
        if !self.entries.contains_key(id) {
            return Ok(None);
        }
        let mut next = self.entries.clone();
        let removed = next.remove(id);
        self.commit(next)?;
        Ok(removed)
    }

    fn commit(&mut self, next: BTreeMap<String, VaultEntry>) -> Result<(), VaultError> {
        let file = IndexFile { version: INDEX_VERSION, entries: next.values().cloned().collect() };
        let bytes = serde_json::to_vec_pretty(&file).map_err(|e| {
            VaultError::destination_write(e.into(), "Failed to serialize catalog index")
        })?;
        tmp::write_atomic(&self.path, &bytes).map_err(|e| {
            VaultError::destination_write(e, format!("Failed to write {}", self.path.display()))
        })?;
        self.entries = next;
        Ok(())
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &VaultEntry> {
        self.entries.values()
    }
}
