//! Low-level cryptographic primitives used throughout the client.
//!
//! Nothing in this module performs I/O; callers feed it blocks and get blocks
//! back. Keeping these free functions instead of types mirrors how the rest
//! of the crate already treated AES/RSA plumbing before this module existed.

use aes::Aes128;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, StreamCipher, StreamCipherSeek};
use aes::cipher::generic_array::GenericArray;
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine};
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::{Error, Result};

pub mod rsa;
pub mod xxtea;

/// Encrypts `data` in place, one 16-byte block at a time, under raw AES-ECB.
///
/// `data.len()` must be a multiple of 16; this is MEGA's node-key wrapping
/// primitive, never used for bulk file data.
pub fn aes_ecb_encrypt_in_place(key: &[u8], data: &mut [u8]) {
    let aes = Aes128::new(key.into());
    for block in data.chunks_mut(16) {
        aes.encrypt_block(block.into());
    }
}

/// Decrypts `data` in place, one 16-byte block at a time, under raw AES-ECB.
pub fn aes_ecb_decrypt_in_place(key: &[u8], data: &mut [u8]) {
    let aes = Aes128::new(key.into());
    for block in data.chunks_mut(16) {
        aes.decrypt_block(block.into());
    }
}

/// Encrypts `data` in place under AES-CBC with an all-zero IV, MEGA's
/// convention for attribute blobs. `data.len()` must be a multiple of 16.
pub fn aes_cbc_zero_iv_encrypt_in_place(key: &[u8], data: &mut [u8]) {
    let mut cbc = cbc::Encryptor::<Aes128>::new(key.into(), &GenericArray::default());
    for chunk in data.chunks_exact_mut(16) {
        cbc.encrypt_block_mut(chunk.into());
    }
}

/// Decrypts `data` in place under AES-CBC with an all-zero IV.
pub fn aes_cbc_zero_iv_decrypt_in_place(key: &[u8], data: &mut [u8]) {
    let mut cbc = cbc::Decryptor::<Aes128>::new(key.into(), &GenericArray::default());
    for chunk in data.chunks_exact_mut(16) {
        cbc.decrypt_block_mut(chunk.into());
    }
}

/// A seekable AES-128-CTR cipher over a 16-byte key and 8-byte nonce, as used
/// for both encrypting uploads and decrypting downloads: the counter for a
/// given byte offset is always `offset / 16`.
pub struct FileCipher {
    inner: ctr::Ctr128BE<Aes128>,
}

impl FileCipher {
    pub fn new(key: &[u8], nonce: &[u8; 8]) -> Self {
        let mut iv = [0u8; 16];
        iv[..8].copy_from_slice(nonce);
        let inner = ctr::Ctr128BE::<Aes128>::new(key.into(), (&iv).into());
        Self { inner }
    }

    /// Positions the keystream so the next `apply` call starts at byte `offset`.
    pub fn seek(&mut self, offset: u64) {
        self.inner.seek(offset);
    }

    /// XORs `data` with the keystream in place (encrypt == decrypt for CTR).
    pub fn apply(&mut self, data: &mut [u8]) {
        self.inner.apply_keystream(data);
    }
}

impl Clone for FileCipher {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Computes the CBC-MAC of `plaintext` under `key`, seeded with `iv` (MEGA
/// always uses `nonce || nonce` as the IV for a chunk's MAC). The final
/// block is zero-padded if `plaintext.len()` isn't a multiple of 16; the
/// padding only affects the MAC's internal state, the caller's buffer is
/// untouched.
pub fn cbc_mac(key: &[u8], iv: &[u8; 16], plaintext: &[u8]) -> [u8; 16] {
    let mut mac = cbc::Encryptor::<Aes128>::new(key.into(), iv.into());
    let mut state = [0u8; 16];

    let (chunks, leftover) = plaintext.split_at(plaintext.len() - plaintext.len() % 16);
    for block in chunks.chunks_exact(16) {
        mac.encrypt_block_b2b_mut(block.into(), (&mut state).into());
    }

    if !leftover.is_empty() {
        let mut padded = [0u8; 16];
        padded[..leftover.len()].copy_from_slice(leftover);
        mac.encrypt_block_b2b_mut((&padded).into(), (&mut state).into());
    }

    state
}

/// Folds an ordered sequence of per-chunk CBC-MACs into the 8-byte meta-MAC
/// stored inside a file key: iteratively AES-ECB-encrypt the running state
/// XORed with each chunk MAC, then XOR-fold the final 16 bytes down to 8.
pub fn meta_mac_fold<'a>(key: &[u8], chunk_macs: impl Iterator<Item = &'a [u8; 16]>) -> [u8; 8] {
    let aes = Aes128::new(key.into());
    let mut state = [0u8; 16];

    for chunk_mac in chunk_macs {
        let mut xored = state;
        for (a, b) in xored.iter_mut().zip(chunk_mac) {
            *a ^= *b;
        }
        aes.encrypt_block((&mut xored).into());
        state = xored;
    }

    fold_16_to_8(&state)
}

/// XOR-folds a 16-byte block into 8 bytes: `out[i] = block[i] ^ block[i+8]`.
pub fn fold_16_to_8(block: &[u8; 16]) -> [u8; 8] {
    let mut out = [0u8; 8];
    for i in 0..8 {
        out[i] = block[i] ^ block[i + 8];
    }
    out
}

/// XORs the first half of `key` with the second half, in place. Used both to
/// go from the wire representation (`key || nonce || meta_mac`) to the raw
/// AES key, and back; the operation is its own inverse.
pub fn xor_halves_in_place(key: &mut [u8]) {
    let half = key.len() / 2;
    let (fst, snd) = key.split_at_mut(half);
    for (a, b) in fst.iter_mut().zip(snd.iter()) {
        *a ^= *b;
    }
}

/// Encodes `data` with MEGA's base64url alphabet (no padding).
pub fn base64url_encode(data: impl AsRef<[u8]>) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(data)
}

/// Decodes a MEGA base64url string (no padding).
pub fn base64url_decode(data: impl AsRef<[u8]>) -> Result<Vec<u8>> {
    Ok(BASE64_URL_SAFE_NO_PAD.decode(data)?)
}

/// Constant-time byte comparison, used for share-key authentication checks
/// so a timing side-channel can't be used to forge `ha` values.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Converts an 8-byte big-endian slice to a `u32`, the word order MEGA uses
/// when it reinterprets a file key as a `u32[8]` array for XXTEA keying.
pub fn be_bytes_to_u32(bytes: &[u8]) -> Result<u32> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::Other("expected 4 bytes".into()))?;
    Ok(u32::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_halves_is_its_own_inverse() {
        let mut key = (0u8..32).collect::<Vec<_>>();
        let original = key.clone();
        xor_halves_in_place(&mut key);
        xor_halves_in_place(&mut key);
        assert_eq!(key, original);
    }

    #[test]
    fn fold_16_to_8_xors_halves() {
        let block = [
            0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE,
            0xFF, 0x00,
        ];
        let folded = fold_16_to_8(&block);
        assert_eq!(folded, [0x11 ^ 0x99, 0x22 ^ 0xAA, 0x33 ^ 0xBB, 0x44 ^ 0xCC, 0x55 ^ 0xDD, 0x66 ^ 0xEE, 0x77 ^ 0xFF, 0x88 ^ 0x00]);
    }

    #[test]
    fn constant_time_eq_detects_mismatch() {
        assert!(constant_time_eq(b"abcd", b"abcd"));
        assert!(!constant_time_eq(b"abcd", b"abce"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    /// A 2-chunk meta-MAC fold with a known AES key, checked against an
    /// independently unrolled version of the same fold below.
    #[test]
    fn meta_mac_fold_matches_reference_vector() {
        let key: [u8; 16] = (0..16).collect::<Vec<u8>>().try_into().unwrap();
        let chunk_mac_0 = [0u8; 16];
        let chunk_mac_1: [u8; 16] = [
            0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE,
            0xFF, 0x00,
        ];

        let folded = meta_mac_fold(&key, [&chunk_mac_0, &chunk_mac_1].into_iter());

        // reproduce the fold independently for the assertion
        let aes = Aes128::new((&key).into());
        let mut state = [0u8; 16];
        for chunk_mac in [&chunk_mac_0, &chunk_mac_1] {
            for (a, b) in state.iter_mut().zip(chunk_mac) {
                *a ^= *b;
            }
            aes.encrypt_block((&mut state).into());
        }
        let expected = fold_16_to_8(&state);

        assert_eq!(folded, expected);
    }
}
