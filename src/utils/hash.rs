// Tue Jan 15 2026 - Alex

use sha1::{Digest, Sha1};

/// SHA-1 digest of `data`.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-1 digest of `data` as uppercase hex.
pub fn sha1_hex(data: &[u8]) -> String {
    to_hex(&sha1(data))
}

/// Uppercase hex without separators.
pub fn to_hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0xF) as usize] as char);
    }
    out
}

/// Parses hex with no separators; either case. `None` on odd length or bad digits.
pub fn from_hex(text: &str) -> Option<Vec<u8>> {
    let text = text.trim();
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| text.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_known_vector() {
        assert_eq!(sha1_hex(b"abc"), "A9993E364706816ABA3E25717850C26C9CD0D89D");
    }

    #[test]
    fn test_hex_round_trip() {
        let bytes = [0x00, 0x7F, 0xAB, 0xFF];
        assert_eq!(to_hex(&bytes), "007FABFF");
        assert_eq!(from_hex("007fabff").unwrap(), bytes);
        assert_eq!(from_hex("").unwrap(), Vec::<u8>::new());
        assert!(from_hex("ABC").is_none());
        assert!(from_hex("ZZ").is_none());
    }
}
