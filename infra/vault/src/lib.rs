//! Streaming authenticated encryption for local media files, with one key per file and
//! random-access decryption for playback.
//!
//! ## Container Format
//!
//! ```text
//! [NONCE(12)][CIPHERTEXT(N)][TAG(16)]
//! ```
//!
//! A container is exactly an AES-256-GCM sealed message with empty associated data,
//! prefixed with its nonce, so any AES-GCM implementation holding the key can open it.
//! There is no header and no version byte; the plaintext length is the file length
//! minus 28.
//!
//! ## Keys
//!
//! Each protected file gets its own 256-bit key, created on first encode and looked up
//! by an alias derived from the file's canonical path
//! (`"watermelon_vault_" + hex(SHA-256(path))`). Keys live in a [`KeyStore`]; the
//! bytes are never exposed outside the cipher setup of this crate.
//!
//! ## Nonce Policy
//!
//! Every encode draws a fresh random 96-bit nonce, including re-encodes of the same file
//! under the same key.
//!
//! ## Random Access and Authentication
//!
//! Playback needs to start anywhere, but the tag authenticates the whole ciphertext.
//! [`VaultSource`] therefore verifies the tag only in sessions that start at offset 0
//! and run to the end of the plaintext, and a mismatch surfaces as
//! [`VaultError::AuthenticationFailure`] on the final read. Seeking sessions return
//! plaintext that has not been authenticated. Use a full sequential read (for example
//! `std::io::copy` into a sink) to check a container's integrity.
//!
//! ## Example
//!
//! ```rust
//! use wmp_vault::prelude::*;
//!
//! # fn main() -> Result<(), VaultError> {
//! # let dir = tempfile::tempdir().unwrap();
//! # let path = dir.path().join("clip.wmv");
//! let keys = KeyManager::new(MemoryKeyStore::new());
//! let key = keys.get_or_create_key(&PathIdentity::new("/media/clip.mp4"))?;
//!
//! let mut container = Vec::new();
//! VaultEncoder::new().encode(&b"frames"[..], &mut container, &key)?;
//! # std::fs::write(&path, &container).unwrap();
//!
//! let mut source = VaultSource::new(&path, &key);
//! assert_eq!(source.open(2, None)?, 4);
//!
//! let mut buf = [0u8; 16];
//! assert_eq!(source.read(&mut buf)?, ReadOutcome::Data(4));
//! assert_eq!(&buf[..4], b"ames");
//! # Ok(())
//! # }
//! ```

mod catalog;
mod cipher;
mod container;
mod decoder;
mod encoder;
mod error;
mod key;
mod keystore;
mod tmp;

pub use catalog::{
    CONTAINER_EXT, INDEX_FILE, NoKeys, NoRoot, VaultCatalog, VaultCatalogBuilder, VaultEntry,
    WithKeys, WithRoot,
};
pub use container::{
    BLOCK_LEN, ContainerInfo, MAX_PLAINTEXT, NONCE_LEN, OVERHEAD, TAG_LEN, inspect,
    is_vault_container, plaintext_len,
};
pub use decoder::{ReadOutcome, VaultSource};
pub use encoder::{CancelFlag, DEFAULT_CHUNK_SIZE, VaultEncoder};
pub use error::{VaultError, VaultErrorExt};
pub use key::{KEY_ALIAS_PREFIX, KEY_LEN, KeyAlias, KeyManager, PathIdentity, ProtectedKey};

pub mod keystores {
    pub use crate::keystore::{
        FileKeyStore, FileKeyStoreBuilder, KeyStore, MemoryKeyStore, NoSecret, RECORD_LEN,
        WithSecret,
    };
}

pub mod prelude {
    pub use crate::catalog::{VaultCatalog, VaultEntry};
    pub use crate::decoder::{ReadOutcome, VaultSource};
    pub use crate::encoder::{CancelFlag, VaultEncoder};
    pub use crate::error::{VaultError, VaultErrorExt};
    pub use crate::key::{KeyManager, PathIdentity, ProtectedKey};
    pub use crate::keystore::{FileKeyStore, KeyStore, MemoryKeyStore};
}

pub use keystore::{FileKeyStore, KeyStore, MemoryKeyStore};
