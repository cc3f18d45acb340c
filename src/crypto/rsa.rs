//! RSA-2048 raw decryption, used only to decrypt MEGA's login session
//! challenge and the user's private keypair. MEGA encodes RSA integers as
//! MPIs (a 16-bit bit-length prefix followed by big-endian bytes) rather
//! than using a standard key format, so parsing is hand-rolled here instead
//! of going through `rsa`'s key-loading API.

use rsa::BigUint;

/// Reads one MPI off the front of `data`, returning the integer and the
/// remaining bytes.
pub fn get_mpi(data: &[u8]) -> (BigUint, &[u8]) {
    let bit_len = data[0] as usize * 256 + data[1] as usize;
    let byte_len = (bit_len + 7) >> 3;
    let (head, tail) = data[2..].split_at(byte_len);
    (BigUint::from_bytes_be(head), tail)
}

/// Parses MEGA's private-key blob: three MPIs, `p`, `q`, `d` (a fourth `u`
/// MPI sometimes follows but is unused for raw decryption).
pub fn get_rsa_private_key(data: &[u8]) -> (BigUint, BigUint, BigUint) {
    let (p, data) = get_mpi(data);
    let (q, data) = get_mpi(data);
    let (d, _) = get_mpi(data);
    (p, q, d)
}

/// Performs raw RSA decryption: `m^d mod (p*q)`. MEGA does not use OAEP or
/// PKCS#1 padding for the session challenge, so this is just modular
/// exponentiation, not a full `rsa` crate decryption call.
pub fn decrypt(ciphertext: BigUint, p: BigUint, q: BigUint, d: BigUint) -> BigUint {
    let n = p * q;
    ciphertext.modpow(&d, &n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mpi_round_trip_length_prefix() {
        // a 16-bit value (2 bytes) prefixed with its bit length (16 = 0x0010)
        let data = [0x00, 0x10, 0xAB, 0xCD, 0xFF, 0xFF];
        let (value, rest) = get_mpi(&data);
        assert_eq!(value, BigUint::from_bytes_be(&[0xAB, 0xCD]));
        assert_eq!(rest, &[0xFF, 0xFF]);
    }
}
