//! POSIX `cksum`-compatible CRC-32.
//!
//! This is deliberately *not* the reflected CRC-32/IEEE ("CRC-32C" and the
//! zlib/gzip variant most `crc32fast`-style crates implement). The `cksum(1)`
//! utility uses a non-reflected CRC-32 with the file length folded into the
//! checksum and the result bit-inverted at the end. `resolve_project_id`
//! needs to be byte-identical to `cksum` so operators can correlate job
//! directories with shell-scripted tooling.

const POLY: u32 = 0x04c1_1db7;

fn table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the `cksum(1)`-compatible CRC-32 of `data`, returned as the
/// unsigned decimal integer `cksum` itself would print.
pub fn cksum_decimal(data: &[u8]) -> u32 {
    let table = table();
    let mut crc: u32 = 0;
    for &byte in data {
        crc = (crc << 8) ^ table[(((crc >> 24) ^ byte as u32) & 0xFF) as usize];
    }
    let mut len = data.len() as u64;
    while len != 0 {
        crc = (crc << 8) ^ table[(((crc >> 24) ^ (len & 0xFF) as u32) & 0xFF) as usize];
        len >>= 8;
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_cksum() {
        // `printf '' | cksum` => "4294967295 0"
        assert_eq!(cksum_decimal(b""), 4_294_967_295);
    }

    #[test]
    fn check_vector_matches_cksum() {
        // `printf '123456789' | cksum` => "1985902208 9"
        assert_eq!(cksum_decimal(b"123456789"), 1_985_902_208);
    }

    #[test]
    fn differs_from_reflected_crc32() {
        // Sanity check that this is not accidentally the zlib/IEEE-reflected
        // CRC-32 of "123456789" (0xCBF43926 = 3421780262).
        assert_ne!(cksum_decimal(b"123456789"), 3_421_780_262);
    }
}
