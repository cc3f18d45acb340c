//! Node key resolution (C3): turning a node's `k` field (`raw_k`) into a
//! usable symmetric key, either via the account's own master key or via a
//! share key obtained through `ok`/`ok0`.

use std::collections::HashMap;

use crate::crypto;
use crate::error::{Error, Result};

/// A 16-byte share key, keyed by the share root's handle.
pub type ShareKeys = HashMap<String, [u8; 16]>;

/// An all-`A` placeholder MEGA sometimes sends in place of real key
/// material for entries the server couldn't resolve.
fn is_placeholder(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b == b'A')
}

/// Tries to resolve a node's encrypted key (`raw_k`, format
/// `id1:enc_k1[/id2:enc_k2...]`) against the account's own user id (using
/// `master_key`) or any known share key, in the order the pairs appear.
/// Returns the decrypted key bytes (16 for a folder, 32 for a file).
pub fn resolve_node_key(
    raw_k: &str,
    user_id: &str,
    master_key: &[u8; 16],
    share_keys: &ShareKeys,
) -> Result<Vec<u8>> {
    for pair in raw_k.split('/') {
        let Some((id, enc_k)) = pair.split_once(':') else {
            continue;
        };

        let key = if id == user_id {
            master_key.as_slice()
        } else if let Some(share_key) = share_keys.get(id) {
            share_key.as_slice()
        } else {
            continue;
        };

        let mut decoded = crypto::base64url_decode(enc_k)?;
        if decoded.len() % 16 != 0 {
            continue;
        }
        crypto::aes_ecb_decrypt_in_place(key, &mut decoded);
        return Ok(decoded);
    }

    Err(Error::NodeNotFound)
}

/// One entry of a share-key list, as carried by either `ok` (legacy) or
/// `ok0` (streaming).
#[derive(Debug, Clone)]
pub struct ShareKeyEntry {
    pub handle: String,
    pub auth_hash: String,
    pub encrypted_key: String,
}

/// Authenticates and decrypts a single share-key entry against
/// `master_key`, returning the 16-byte share key on success. Entries with
/// placeholder data, or whose auth hash doesn't match, are rejected
/// (`Ok(None)`, not an error — a bad entry just means that share stays
/// unreadable, it doesn't abort the whole tree fetch).
pub fn authenticate_share_key(
    entry: &ShareKeyEntry,
    master_key: &[u8; 16],
) -> Result<Option<[u8; 16]>> {
    if is_placeholder(&entry.auth_hash) || is_placeholder(&entry.encrypted_key) {
        return Ok(None);
    }

    let ha = crypto::base64url_decode(&entry.auth_hash)?;

    let mut expected = [0u8; 16];
    let handle_bytes = entry.handle.as_bytes();
    let len = handle_bytes.len().min(8);
    expected[..len].copy_from_slice(&handle_bytes[..len]);
    expected[8..8 + len].copy_from_slice(&handle_bytes[..len]);
    crypto::aes_ecb_encrypt_in_place(master_key, &mut expected);

    if !crypto::constant_time_eq(&ha, &expected) {
        return Ok(None);
    }

    let mut key = crypto::base64url_decode(&entry.encrypted_key)?;
    if key.len() != 16 {
        return Ok(None);
    }
    crypto::aes_ecb_decrypt_in_place(master_key, &mut key);

    Ok(Some(key.try_into().unwrap()))
}

/// Builds the share-key table from a tree-fetch response: per §4.3, if both
/// `ok` and `ok0` are present in one response, `ok0` wins outright and `ok`
/// is ignored (not merged).
pub fn build_share_keys(
    ok: Option<&[ShareKeyEntry]>,
    ok0: Option<&[ShareKeyEntry]>,
    master_key: &[u8; 16],
) -> Result<ShareKeys> {
    let source = ok0.or(ok).unwrap_or(&[]);

    let mut keys = ShareKeys::new();
    for entry in source {
        if let Some(key) = authenticate_share_key(entry, master_key)? {
            keys.insert(entry.handle.clone(), key);
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_placeholder_detects_all_a_strings() {
        assert!(is_placeholder("AAAAAAAAAAAAAAAAAAAAAA"));
        assert!(!is_placeholder("AAAAAAAAAAAAAAAAAAAAAB"));
        assert!(!is_placeholder(""));
    }

    #[test]
    fn ok0_wins_over_ok_when_both_present() {
        let master_key = [0u8; 16];

        let mut ha_bytes = [0u8; 16];
        let handle = b"H1______";
        ha_bytes[..8].copy_from_slice(handle);
        ha_bytes[8..].copy_from_slice(handle);
        crypto::aes_ecb_encrypt_in_place(&master_key, &mut ha_bytes);
        let ha = crypto::base64url_encode(ha_bytes);

        let mut k_bytes = [0x42u8; 16];
        crypto::aes_ecb_encrypt_in_place(&master_key, &mut k_bytes);
        let k = crypto::base64url_encode(k_bytes);

        let ok0_entry = ShareKeyEntry {
            handle: "H1______".to_string(),
            auth_hash: ha.clone(),
            encrypted_key: k.clone(),
        };
        let ok_entry = ShareKeyEntry {
            handle: "H1______".to_string(),
            auth_hash: "AAAAAAAAAAAAAAAAAAAAAA".to_string(),
            encrypted_key: "AAAAAAAAAAAAAAAAAAAAAA".to_string(),
        };

        let keys = build_share_keys(Some(&[ok_entry]), Some(&[ok0_entry]), &master_key).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys["H1______"], [0x42u8; 16]);
    }

    #[test]
    fn own_user_pair_is_preferred_over_share_pair() {
        let master_key = [0x11u8; 16];
        let mut share_keys = ShareKeys::new();
        share_keys.insert("shareuser".to_string(), [0x22u8; 16]);

        let mut own_key = [0x33u8; 16];
        crypto::aes_ecb_encrypt_in_place(&master_key, &mut own_key);
        let own_enc = crypto::base64url_encode(own_key);

        let mut share_key_bytes = [0x44u8; 16];
        crypto::aes_ecb_encrypt_in_place(&[0x22u8; 16], &mut share_key_bytes);
        let share_enc = crypto::base64url_encode(share_key_bytes);

        let raw_k = format!("me:{own_enc}/shareuser:{share_enc}");
        let resolved = resolve_node_key(&raw_k, "me", &master_key, &share_keys).unwrap();

        assert_eq!(resolved, vec![0x33u8; 16]);
    }
}
