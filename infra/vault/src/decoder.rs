//! # Random-Access Decoding
//!
//! [`VaultSource`] serves byte ranges of a container's plaintext. A session opened at
//! offset `p` starts the CTR keystream at block `p / 16`, positions the file at the
//! matching ciphertext block, then decrypts and drops the `p % 16` leading bytes.
//!
//! The tag covers the whole ciphertext, so it can only be checked by a session that
//! reads every byte: one opened at offset 0 whose declared range reaches the end of the
//! plaintext. Such a session verifies on the read that consumes the final byte, and a
//! mismatch withholds that read's plaintext. Sessions opened anywhere else, or with a
//! shorter range, return unauthenticated plaintext. Players rely on them for seeking.

use crate::cipher::{Block, GcmCore, Keystream, TagAccumulator, apply_keystream};
use crate::container::{self, BLOCK_LEN, NONCE_LEN, TAG_LEN};
use crate::error::{VaultError, VaultErrorExt};
use crate::key::ProtectedKey;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::Zeroize;

/// Result of one [`VaultSource::read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` plaintext bytes were written to the front of the buffer.
    Data(usize),
    /// The declared range is exhausted.
    EndOfStream,
}

struct Verifier {
    ghash: TagAccumulator,
    mask: Block,
}

/// State of one playback session: file handle, positioned keystream, optional verifier.
struct StreamCursor {
    reader: BufReader<File>,
    keystream: Keystream,
    verifier: Option<Verifier>,
    position: u64,
    remaining: u64,
}

impl fmt::Debug for StreamCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCursor")
            .field("position", &self.position)
            .field("remaining", &self.remaining)
            .field("verifying", &self.verifier.is_some())
            .finish_non_exhaustive()
    }
}

impl StreamCursor {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, VaultError> {
        if self.remaining == 0 {
            if let Some(verifier) = self.verifier.take() {
                self.verify(verifier)?;
            }
            return Ok(ReadOutcome::EndOfStream);
        }
        if buf.is_empty() {
            return Ok(ReadOutcome::Data(0));
        }

        let n = usize::try_from(self.remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let out = &mut buf[..n];
        self.reader
            .read_exact(out)
            .map_err(|e| VaultError::io(e, format!("Failed to read ciphertext at {}", self.position)))?;

        if let Some(verifier) = &mut self.verifier {
            verifier.ghash.update(out);
        }
        apply_keystream(&mut self.keystream, out)?;
        self.position += n as u64;
        self.remaining -= n as u64;

        if self.remaining == 0
            && let Some(verifier) = self.verifier.take()
            && let Err(err) = self.verify(verifier)
        {
            out.zeroize();
            return Err(err);
        }

        Ok(ReadOutcome::Data(n))
    }

    fn verify(&mut self, verifier: Verifier) -> Result<(), VaultError> {
        let mut tag = [0u8; TAG_LEN];
        self.reader.read_exact(&mut tag).map_err(|e| VaultError::io(e, "Failed to read tag"))?;

        if verifier.ghash.verify(&tag, &verifier.mask) {
            debug!(bytes = self.position, "Container authenticated");
            Ok(())
        } else {
            Err(VaultError::AuthenticationFailure {
                message: "authentication tag mismatch".into(),
                context: None,
            })
        }
    }
}

/// A seekable byte-range source over one container.
///
/// Each `open` starts a new session and discards the previous one. Sessions are
/// sequential; for parallel readers create one `VaultSource` per reader.
pub struct VaultSource {
    path: PathBuf,
    core: GcmCore,
    cursor: Option<StreamCursor>,
    opened: bool,
}

impl fmt::Debug for VaultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSource")
            .field("path", &self.path)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl VaultSource {
    pub fn new(path: impl Into<PathBuf>, key: &ProtectedKey) -> Self {
        Self { path: path.into(), core: GcmCore::new(key), cursor: None, opened: false }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.cursor.is_some()
    }

    /// Plaintext offset of the next byte, if a session is open.
    #[must_use]
    pub fn position(&self) -> Option<u64> {
        self.cursor.as_ref().map(|c| c.position)
    }

    /// Starts a session at plaintext offset `position`.
    ///
    /// `length = None` reads to the end. Returns the declared length of the session,
    /// `min(length, plaintext_len - position)`.
    ///
    /// # Errors
    /// * [`VaultError::Io`] if the container cannot be opened or read.
    /// * [`VaultError::ContainerFormat`] if its length is not a valid container length.
    /// * [`VaultError::InvalidRange`] if `position` lies beyond the plaintext.
    pub fn open(&mut self, position: u64, length: Option<u64>) -> Result<u64, VaultError> {
        self.close();

        let shown = self.path.display().to_string();
        let mut file =
            File::open(&self.path).map_err(|e| VaultError::io(e, format!("Failed to open {shown}")))?;
        let container_len = file
            .metadata()
            .map_err(|e| VaultError::io(e, format!("Failed to inspect {shown}")))?
            .len();
        let plaintext_len = container::plaintext_len(container_len).context(shown.clone())?;

        if position > plaintext_len {
            return Err(VaultError::InvalidRange {
                message: format!("offset {position} beyond plaintext length {plaintext_len}").into(),
                context: Some(shown.into()),
            });
        }

        let mut nonce = [0u8; NONCE_LEN];
        file.read_exact(&mut nonce).map_err(|e| VaultError::io(e, "Failed to read nonce"))?;

        let available = plaintext_len - position;
        let declared = length.map_or(available, |l| l.min(available));
        let block = position / BLOCK_LEN as u64;
        let skip = (position % BLOCK_LEN as u64) as usize;

        let mut keystream = self.core.keystream_at(&nonce, block)?;
        file.seek(SeekFrom::Start(NONCE_LEN as u64 + block * BLOCK_LEN as u64))
            .map_err(|e| VaultError::io(e, format!("Failed to seek to block {block}")))?;
        let mut reader = BufReader::new(file);

        if skip > 0 {
            let mut discard = [0u8; BLOCK_LEN];
            reader
                .read_exact(&mut discard[..skip])
                .map_err(|e| VaultError::io(e, "Failed to read partial block"))?;
            apply_keystream(&mut keystream, &mut discard[..skip])?;
            discard.zeroize();
        }

        let verifier = (position == 0 && declared == plaintext_len).then(|| Verifier {
            ghash: self.core.tag_accumulator(),
            mask: self.core.tag_mask(&nonce),
        });

        debug!(
            path = %shown,
            position,
            declared,
            verifying = verifier.is_some(),
            "Playback session opened"
        );

        self.cursor = Some(StreamCursor { reader, keystream, verifier, position, remaining: declared });
        self.opened = true;
        Ok(declared)
    }

    /// Decrypts up to `min(buf.len(), remaining)` bytes of the open session.
    ///
    /// # Errors
    /// * [`VaultError::InvalidRange`] if no session is open.
    /// * [`VaultError::AuthenticationFailure`] on a tag mismatch; the session is closed
    ///   and the bytes of this read are not returned.
    /// * [`VaultError::Io`] if the container cannot be read.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, VaultError> {
        let cursor = self.cursor.as_mut().ok_or_else(|| VaultError::InvalidRange {
            message: "source is not open".into(),
            context: Some(self.path.display().to_string().into()),
        })?;

        match cursor.read(buf) {
            Err(err) if err.is_integrity_failure() => {
                self.close();
                Err(err)
            },
            other => other,
        }
    }

    /// Ends the session, releasing the file handle and cipher state. Idempotent.
    pub fn close(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            debug!(path = %self.path.display(), position = cursor.position, "Playback session closed");
        }
    }
}

impl Drop for VaultSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Plain-file view: the first read opens a session at offset 0, and seeking re-opens
/// at the target with an unbounded range. A never-opened source counts as positioned
/// at 0; once a session was closed, relative seeks fail with `InvalidInput`.
impl Read for VaultSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.opened {
            self.open(0, None)?;
        }
        match Self::read(self, buf)? {
            ReadOutcome::Data(n) => Ok(n),
            ReadOutcome::EndOfStream => Ok(0),
        }
    }
}

impl Seek for VaultSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let current = self.position();
        if let (SeekFrom::Current(0), Some(position)) = (pos, current) {
            return Ok(position);
        }

        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => {
                container::inspect(&self.path)?.plaintext_len.checked_add_signed(delta)
            },
            SeekFrom::Current(delta) => match current {
                Some(position) => position.checked_add_signed(delta),
                None if !self.opened => delta.try_into().ok(),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "relative seek without an open session",
                    ));
                },
            },
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative offset"))?;

        if current == Some(target) {
            return Ok(target);
        }
        self.open(target, None)?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::VaultEncoder;
    use crate::key::KEY_LEN;

    fn sealed(dir: &Path, plaintext: &[u8], key: &ProtectedKey) -> PathBuf {
        let path = dir.join("clip.wmv");
        let mut out = Vec::new();
        VaultEncoder::new().encode(plaintext, &mut out, key).unwrap();
        std::fs::write(&path, out).unwrap();
        path
    }

    #[test]
    fn read_before_open_is_invalid_range() {
        let key = ProtectedKey::import([1; KEY_LEN]);
        let mut source = VaultSource::new("/nonexistent.wmv", &key);
        let err = source.read(&mut [0u8; 4]).unwrap_err();
        assert!(matches!(err, VaultError::InvalidRange { .. }));
    }

    #[test]
    fn failed_verification_closes_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let key = ProtectedKey::import([1; KEY_LEN]);
        let path = sealed(dir.path(), &[5u8; 40], &key);

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 1;
        std::fs::write(&path, bytes).unwrap();

        let mut source = VaultSource::new(&path, &key);
        assert_eq!(source.open(0, None).unwrap(), 40);

        let mut buf = [0u8; 64];
        let err = source.read(&mut buf).unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailure { .. }));
        assert_eq!(buf, [0u8; 64]);
        assert!(!source.is_open());
    }

    #[test]
    fn position_tracks_reads() {
        let dir = tempfile::tempdir().unwrap();
        let key = ProtectedKey::import([2; KEY_LEN]);
        let path = sealed(dir.path(), &[9u8; 100], &key);

        let mut source = VaultSource::new(&path, &key);
        source.open(33, Some(10)).unwrap();
        assert_eq!(source.position(), Some(33));

        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).unwrap(), ReadOutcome::Data(4));
        assert_eq!(source.position(), Some(37));

        source.close();
        assert_eq!(source.position(), None);
    }

    #[test]
    fn current_seek_does_not_restart_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let key = ProtectedKey::import([3; KEY_LEN]);
        let path = sealed(dir.path(), &[4u8; 48], &key);

        let mut source = VaultSource::new(&path, &key);
        source.open(0, None).unwrap();
        let mut buf = [0u8; 20];
        source.read(&mut buf).unwrap();

        assert_eq!(source.stream_position().unwrap(), 20);
        assert!(source.cursor.as_ref().unwrap().verifier.is_some());
    }

    #[test]
    fn relative_seek_needs_a_session_once_closed() {
        let dir = tempfile::tempdir().unwrap();
        let key = ProtectedKey::import([5; KEY_LEN]);
        let path = sealed(dir.path(), &[8u8; 64], &key);

        let mut source = VaultSource::new(&path, &key);
        assert_eq!(source.seek(SeekFrom::Current(10)).unwrap(), 10);
        assert_eq!(source.position(), Some(10));

        source.close();
        let err = source.seek(SeekFrom::Current(0)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        let err = source.seek(SeekFrom::Current(4)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        assert_eq!(source.seek(SeekFrom::Start(4)).unwrap(), 4);
        assert_eq!(source.seek(SeekFrom::Current(4)).unwrap(), 8);
    }
}
