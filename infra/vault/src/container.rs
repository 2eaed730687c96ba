//! On-disk container layout: `[nonce: 12][ciphertext: n][tag: 16]`.

use crate::error::VaultError;
use std::path::Path;

/// Length of the GCM nonce stored at the start of a container.
pub const NONCE_LEN: usize = 12;
/// Length of the GCM authentication tag stored at the end of a container.
pub const TAG_LEN: usize = 16;
/// AES block size; the granularity of random access.
pub const BLOCK_LEN: usize = 16;
/// Bytes a container adds on top of its plaintext.
pub const OVERHEAD: u64 = (NONCE_LEN + TAG_LEN) as u64;
/// Largest plaintext one GCM message may carry: `(2^32 - 2)` blocks.
pub const MAX_PLAINTEXT: u64 = ((1u64 << 32) - 2) * BLOCK_LEN as u64;

/// Plaintext length of a container of `container_len` bytes.
///
/// # Errors
/// Returns [`VaultError::ContainerFormat`] if the length cannot hold a nonce and a tag,
/// or implies a plaintext beyond the GCM limit.
pub fn plaintext_len(container_len: u64) -> Result<u64, VaultError> {
    let plain = container_len
        .checked_sub(OVERHEAD)
        .ok_or_else(|| VaultError::format("file shorter than nonce and tag"))?;
    if plain > MAX_PLAINTEXT {
        return Err(VaultError::format("ciphertext exceeds AES-GCM limit"));
    }
    Ok(plain)
}

/// Size facts about a container, read from file metadata only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerInfo {
    pub container_len: u64,
    pub plaintext_len: u64,
}

/// Reports the logical size of the container at `path` without decrypting it.
///
/// # Errors
/// Returns [`VaultError::Io`] if the file cannot be inspected and
/// [`VaultError::ContainerFormat`] if its length is not a valid container length.
pub fn inspect(path: impl AsRef<Path>) -> Result<ContainerInfo, VaultError> {
    let path = path.as_ref();
    let container_len = std::fs::metadata(path)
        .map_err(|e| VaultError::io(e, format!("Failed to inspect {}", path.display())))?
        .len();
    let plaintext_len = plaintext_len(container_len)?;
    Ok(ContainerInfo { container_len, plaintext_len })
}

/// Format-level check: the file exists and is long enough to hold a nonce and a tag.
///
/// This does not authenticate the contents.
#[must_use]
pub fn is_vault_container(path: impl AsRef<Path>) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && plaintext_len(m.len()).is_ok())
}
