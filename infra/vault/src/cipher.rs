//! AES-256-GCM split into its CTR and GHASH halves so decryption can start at any block.
//!
//! The output is bit-identical to a one-shot AES-256-GCM seal with empty associated
//! data: `H = E_K(0^128)`, `J0 = nonce || 0x00000001`, data block `i` is encrypted with
//! counter `nonce || BE32(2 + i)`, and `tag = GHASH_H(C || lengths) ^ E_K(J0)`.

use crate::container::{BLOCK_LEN, NONCE_LEN, TAG_LEN};
use crate::error::VaultError;
use crate::key::ProtectedKey;
use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, InnerIvInit, KeyInit, StreamCipher};
use ghash::GHash;
use ghash::universal_hash::UniversalHash;
use std::fmt;
use zeroize::Zeroize;

pub(crate) type Block = [u8; BLOCK_LEN];
pub(crate) type Keystream = ctr::Ctr32BE<Aes256>;

const FIRST_DATA_COUNTER: u32 = 2;

/// Per-key cipher state shared by the keystream and the tag computation.
pub(crate) struct GcmCore {
    aes: Aes256,
    h: Block,
}

impl fmt::Debug for GcmCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcmCore").finish_non_exhaustive()
    }
}

impl Drop for GcmCore {
    fn drop(&mut self) {
        self.h.zeroize();
    }
}

impl GcmCore {
    pub(crate) fn new(key: &ProtectedKey) -> Self {
        let aes = Aes256::new(GenericArray::from_slice(key.expose()));
        let mut block = aes::Block::default();
        aes.encrypt_block(&mut block);

        let mut h = [0u8; BLOCK_LEN];
        h.copy_from_slice(&block);
        Self { aes, h }
    }

    /// CTR keystream positioned at the start of plaintext block `block`.
    pub(crate) fn keystream_at(
        &self,
        nonce: &[u8; NONCE_LEN],
        block: u64,
    ) -> Result<Keystream, VaultError> {
        let counter = u32::try_from(block)
            .ok()
            .and_then(|b| b.checked_add(FIRST_DATA_COUNTER))
            .ok_or_else(|| VaultError::InvalidRange {
                message: format!("block {block} is beyond the AES-GCM counter space").into(),
                context: None,
            })?;

        let mut iv = [0u8; BLOCK_LEN];
        iv[..NONCE_LEN].copy_from_slice(nonce);
        iv[NONCE_LEN..].copy_from_slice(&counter.to_be_bytes());
        let core = ctr::CtrCore::<Aes256, ctr::flavors::Ctr32BE>::inner_iv_init(
            self.aes.clone(),
            GenericArray::from_slice(&iv),
        );
        Ok(Keystream::from_core(core))
    }

    /// `E_K(J0)`, the value the GHASH output is masked with.
    pub(crate) fn tag_mask(&self, nonce: &[u8; NONCE_LEN]) -> Block {
        let mut j0 = aes::Block::default();
        j0[..NONCE_LEN].copy_from_slice(nonce);
        j0[BLOCK_LEN - 1] = 1;
        self.aes.encrypt_block(&mut j0);

        let mut mask = [0u8; BLOCK_LEN];
        mask.copy_from_slice(&j0);
        mask
    }

    pub(crate) fn tag_accumulator(&self) -> TagAccumulator {
        TagAccumulator::new(&self.h)
    }
}

pub(crate) fn apply_keystream(keystream: &mut Keystream, buf: &mut [u8]) -> Result<(), VaultError> {
    keystream
        .try_apply_keystream(buf)
        .map_err(|_| VaultError::from("AES-GCM keystream exhausted"))
}

/// Incremental GHASH over the ciphertext, fed in arbitrary-sized pieces.
pub(crate) struct TagAccumulator {
    ghash: GHash,
    pending: Block,
    pending_len: usize,
    len: u64,
}

impl fmt::Debug for TagAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagAccumulator").field("len", &self.len).finish_non_exhaustive()
    }
}

impl TagAccumulator {
    fn new(h: &Block) -> Self {
        Self {
            ghash: GHash::new(GenericArray::from_slice(h)),
            pending: [0u8; BLOCK_LEN],
            pending_len: 0,
            len: 0,
        }
    }

    /// Number of ciphertext bytes absorbed so far.
    pub(crate) const fn len(&self) -> u64 {
        self.len
    }

    pub(crate) fn update(&mut self, mut data: &[u8]) {
        self.len += data.len() as u64;

        if self.pending_len > 0 {
            let take = (BLOCK_LEN - self.pending_len).min(data.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];

            if self.pending_len < BLOCK_LEN {
                return;
            }
            self.ghash.update_padded(&self.pending);
            self.pending_len = 0;
        }

        let whole = data.len() - data.len() % BLOCK_LEN;
        if whole > 0 {
            self.ghash.update_padded(&data[..whole]);
        }

        let rest = &data[whole..];
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();
    }

    fn finish(mut self) -> GHash {
        if self.pending_len > 0 {
            self.ghash.update_padded(&self.pending[..self.pending_len]);
        }

        // Lengths block: 64-bit AAD bit length (always zero) then ciphertext bit length.
        let mut lengths = [0u8; BLOCK_LEN];
        lengths[8..].copy_from_slice(&(self.len * 8).to_be_bytes());
        self.ghash.update_padded(&lengths);
        self.pending.zeroize();
        self.ghash
    }

    pub(crate) fn tag(self, mask: &Block) -> [u8; TAG_LEN] {
        let digest = self.finish().finalize();
        let mut tag = [0u8; TAG_LEN];
        for (out, (d, m)) in tag.iter_mut().zip(digest.iter().zip(mask)) {
            *out = d ^ m;
        }
        tag
    }

    /// Constant-time comparison of the computed tag against `expected`.
    pub(crate) fn verify(self, expected: &[u8; TAG_LEN], mask: &Block) -> bool {
        let mut unmasked = [0u8; TAG_LEN];
        for (out, (t, m)) in unmasked.iter_mut().zip(expected.iter().zip(mask)) {
            *out = t ^ m;
        }
        self.finish().verify(GenericArray::from_slice(&unmasked)).is_ok()
    }
}
