//! XXTEA (Corrected Block TEA), used only to encrypt/decrypt the 8-byte
//! media-attribute payloads (attrs `8` and `9`). MEGA never uses it for bulk
//! data, so this stays a small, self-contained primitive rather than a
//! pulled-in crate: the algorithm is a handful of lines of wrapping 32-bit
//! arithmetic specified exactly by MEGA's SDK, not a composable building
//! block worth depending on an external implementation for.

const DELTA: u32 = 0x9E3779B9;

fn mx(sum: u32, y: u32, z: u32, p: u32, e: u32, key: &[u32; 4]) -> u32 {
    ((z >> 5 ^ y << 2).wrapping_add(y >> 3 ^ z << 4))
        ^ ((sum ^ y).wrapping_add(key[((p ^ e) & 3) as usize] ^ z))
}

/// Encrypts `v` in place under `key`. `v` must have at least 2 elements.
pub fn encrypt(v: &mut [u32], key: &[u32; 4]) {
    let n = v.len();
    if n < 2 {
        return;
    }

    let rounds = 6 + 52 / n as u32;
    let mut sum = 0u32;
    let mut z = v[n - 1];

    for _ in 0..rounds {
        sum = sum.wrapping_add(DELTA);
        let e = (sum >> 2) & 3;

        for p in 0..n {
            let y = v[(p + 1) % n];
            z = v[p].wrapping_add(mx(sum, y, z, p as u32, e, key));
            v[p] = z;
        }
    }
}

/// Decrypts `v` in place under `key`. `v` must have at least 2 elements.
pub fn decrypt(v: &mut [u32], key: &[u32; 4]) {
    let n = v.len();
    if n < 2 {
        return;
    }

    let rounds = 6 + 52 / n as u32;
    let mut sum = rounds.wrapping_mul(DELTA);
    let mut y = v[0];

    for _ in 0..rounds {
        let e = (sum >> 2) & 3;

        for p in (0..n).rev() {
            let z = v[if p == 0 { n - 1 } else { p - 1 }];
            y = v[p].wrapping_sub(mx(sum, y, z, p as u32, e, key));
            v[p] = y;
        }

        sum = sum.wrapping_sub(DELTA);
    }
}

/// Decrypts an 8-byte little-endian media-attribute payload under a key
/// derived from the second half of a file key (see `crate::crypto::be_bytes_to_u32`
/// and the module docs on the big-endian/little-endian split).
pub fn decrypt_payload(payload: &[u8; 8], key: &[u32; 4]) -> [u8; 8] {
    let mut v = [
        u32::from_le_bytes(payload[0..4].try_into().unwrap()),
        u32::from_le_bytes(payload[4..8].try_into().unwrap()),
    ];
    decrypt(&mut v, key);

    let mut out = [0u8; 8];
    out[0..4].copy_from_slice(&v[0].to_le_bytes());
    out[4..8].copy_from_slice(&v[1].to_le_bytes());
    out
}

/// Encrypts an 8-byte little-endian media-attribute payload under `key`.
pub fn encrypt_payload(payload: &[u8; 8], key: &[u32; 4]) -> [u8; 8] {
    let mut v = [
        u32::from_le_bytes(payload[0..4].try_into().unwrap()),
        u32::from_le_bytes(payload[4..8].try_into().unwrap()),
    ];
    encrypt(&mut v, key);

    let mut out = [0u8; 8];
    out[0..4].copy_from_slice(&v[0].to_le_bytes());
    out[4..8].copy_from_slice(&v[1].to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_two_word_vector() {
        let key = [0x01020304u32, 0x05060708, 0x090A0B0C, 0x0D0E0F10];
        let original = [0xDEADBEEFu32, 0xCAFEBABE];

        let mut v = original;
        encrypt(&mut v, &key);
        assert_ne!(v, original);

        decrypt(&mut v, &key);
        assert_eq!(v, original);
    }

    #[test]
    fn payload_round_trip() {
        let key = [0x10111213u32, 0x14151617, 0x18191A1B, 0x1C1D1E1F];
        let payload = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

        let encrypted = encrypt_payload(&payload, &key);
        let decrypted = decrypt_payload(&encrypted, &key);

        assert_eq!(decrypted, payload);
    }
}
