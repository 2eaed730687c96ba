//! Streaming encryption of a plaintext source into a vault container.

use crate::cipher::{GcmCore, apply_keystream};
use crate::container::{MAX_PLAINTEXT, NONCE_LEN, OVERHEAD};
use crate::error::VaultError;
use crate::key::ProtectedKey;
use crate::tmp::{self, TempPath};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Default number of plaintext bytes processed per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Cooperative cancellation signal, observed at chunk boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Turns a plaintext stream into `[nonce][ciphertext][tag]`.
///
/// Memory use is bounded by the chunk size regardless of the input length. Every call
/// draws a fresh nonce from the OS CSPRNG, so re-encoding the same file under the same
/// key never reuses a nonce.
#[derive(Debug, Clone, Copy)]
pub struct VaultEncoder {
    chunk_size: usize,
}

impl Default for VaultEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VaultEncoder {
    #[must_use]
    pub const fn new() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE }
    }

    /// Uses `chunk_size` bytes per read. Zero is treated as one.
    #[must_use]
    pub const fn with_chunk_size(chunk_size: usize) -> Self {
        Self { chunk_size: if chunk_size == 0 { 1 } else { chunk_size } }
    }

    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Encrypts `source` into `destination` and returns the container length written.
    ///
    /// # Errors
    /// * [`VaultError::SourceRead`] if reading fails or the plaintext exceeds the
    ///   AES-GCM limit.
    /// * [`VaultError::DestinationWrite`] if writing fails.
    pub fn encode(
        &self,
        source: impl Read,
        destination: impl Write,
        key: &ProtectedKey,
    ) -> Result<u64, VaultError> {
        self.seal_stream(source, destination, key, fresh_nonce()?, None)
    }

    /// Like [`VaultEncoder::encode`], but stops with [`VaultError::Cancelled`] once
    /// `cancel` is raised. The destination then holds an incomplete container.
    pub fn encode_with_cancel(
        &self,
        source: impl Read,
        destination: impl Write,
        key: &ProtectedKey,
        cancel: &CancelFlag,
    ) -> Result<u64, VaultError> {
        self.seal_stream(source, destination, key, fresh_nonce()?, Some(cancel))
    }

    /// Encrypts the file at `source_path` into `destination_path`.
    ///
    /// The container is written to a temporary sibling, synced, and renamed into place.
    /// On any failure or cancellation the temporary file is deleted and an existing
    /// destination is left untouched.
    pub fn encode_file(
        &self,
        source_path: impl AsRef<Path>,
        destination_path: impl AsRef<Path>,
        key: &ProtectedKey,
        cancel: &CancelFlag,
    ) -> Result<u64, VaultError> {
        let source_path = source_path.as_ref();
        let destination = destination_path.as_ref();

        let source = File::open(source_path).map_err(|e| {
            VaultError::source_read(e, format!("Failed to open {}", source_path.display()))
        })?;

        let temp = TempPath::for_target(destination);
        let written = {
            let mut file = temp.create().map_err(|e| {
                VaultError::destination_write(e, format!("Failed to create {}", temp.path().display()))
            })?;
            let written = self.encode_with_cancel(source, &mut file, key, cancel)?;
            file.sync_all()
                .map_err(|e| VaultError::destination_write(e, "Failed to sync container"))?;
            written
        };

        temp.persist(destination).map_err(|e| {
            VaultError::destination_write(e, format!("Failed to move container to {}", destination.display()))
        })?;
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tmp::sync_dir(parent);
        }

        info!(path = %destination.display(), bytes = written, "Container written");
        Ok(written)
    }

    #[cfg(test)]
    pub(crate) fn encode_with_nonce(
        &self,
        source: impl Read,
        destination: impl Write,
        key: &ProtectedKey,
        nonce: [u8; NONCE_LEN],
    ) -> Result<u64, VaultError> {
        self.seal_stream(source, destination, key, nonce, None)
    }

    fn seal_stream(
        &self,
        mut source: impl Read,
        mut destination: impl Write,
        key: &ProtectedKey,
        nonce: [u8; NONCE_LEN],
        cancel: Option<&CancelFlag>,
    ) -> Result<u64, VaultError> {
        let core = GcmCore::new(key);
        let mut keystream = core.keystream_at(&nonce, 0)?;
        let mut ghash = core.tag_accumulator();
        let mut buf = Zeroizing::new(vec![0u8; self.chunk_size]);

        destination
            .write_all(&nonce)
            .map_err(|e| VaultError::destination_write(e, "Failed to write nonce"))?;

        loop {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                debug!(bytes = ghash.len(), "Encode cancelled");
                return Err(VaultError::Cancelled {
                    message: "encode cancelled".into(),
                    context: None,
                });
            }

            let n = fill_chunk(&mut source, &mut buf)?;
            if n == 0 {
                break;
            }
            if ghash.len() + n as u64 > MAX_PLAINTEXT {
                return Err(VaultError::SourceRead {
                    source: io::Error::new(io::ErrorKind::InvalidInput, "input too long"),
                    context: Some("plaintext exceeds AES-GCM limit".into()),
                });
            }

            let chunk = &mut buf[..n];
            apply_keystream(&mut keystream, chunk)?;
            ghash.update(chunk);
            destination
                .write_all(chunk)
                .map_err(|e| VaultError::destination_write(e, "Failed to write ciphertext"))?;
        }

        let plaintext = ghash.len();
        let tag = ghash.tag(&core.tag_mask(&nonce));
        destination
            .write_all(&tag)
            .and_then(|()| destination.flush())
            .map_err(|e| VaultError::destination_write(e, "Failed to write tag"))?;

        debug!(plaintext, "Container sealed");
        Ok(OVERHEAD + plaintext)
    }
}

fn fresh_nonce() -> Result<[u8; NONCE_LEN], VaultError> {
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::fill(&mut nonce)
        .map_err(|e| VaultError::from(format!("System RNG unavailable for nonce generation: {e}")))?;
    Ok(nonce)
}

/// Reads until `buf` is full or the source is exhausted.
fn fill_chunk(source: &mut impl Read, buf: &mut [u8]) -> Result<usize, VaultError> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
            Err(e) => return Err(VaultError::source_read(e, "Failed to read plaintext")),
        }
    }
    Ok(filled)
}
