#![allow(dead_code)]

use std::path::{Path, PathBuf};
use wmp_vault::prelude::*;

/// Deterministic, non-repeating-looking test media.
#[must_use]
pub fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 7 + i / 251) % 256) as u8).collect()
}

#[must_use]
pub fn key_for(identity: &str) -> ProtectedKey {
    KeyManager::new(MemoryKeyStore::new())
        .get_or_create_key(&PathIdentity::new(identity))
        .expect("memory key store failed")
}

/// Encodes `plaintext` into `<dir>/<name>` and returns the container path.
/// # Panics
/// * If encoding or writing fails.
pub fn seal(dir: &Path, name: &str, plaintext: &[u8], key: &ProtectedKey) -> PathBuf {
    let path = dir.join(name);
    let mut container = Vec::new();
    VaultEncoder::new().encode(plaintext, &mut container, key).expect("encode failed");
    std::fs::write(&path, container).expect("write failed");
    path
}

/// Drains an open session into a vector.
pub fn drain(source: &mut VaultSource) -> Result<Vec<u8>, VaultError> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match source.read(&mut buf)? {
            ReadOutcome::Data(n) => out.extend_from_slice(&buf[..n]),
            ReadOutcome::EndOfStream => return Ok(out),
        }
    }
}

/// Opens `[position, position + length)` and reads it to the end.
pub fn read_range(
    path: &Path,
    key: &ProtectedKey,
    position: u64,
    length: Option<u64>,
) -> Result<Vec<u8>, VaultError> {
    let mut source = VaultSource::new(path, key);
    source.open(position, length)?;
    drain(&mut source)
}

/// Flips one bit of the file at `offset`.
/// # Panics
/// * If the file cannot be read or written.
pub fn flip_bit(path: &Path, offset: usize) {
    let mut bytes = std::fs::read(path).expect("read failed");
    bytes[offset] ^= 0x01;
    std::fs::write(path, bytes).expect("write failed");
}
