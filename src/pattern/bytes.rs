// Tue Jan 13 2026 - Alex

use super::error::PatternError;
use std::fmt;

/// Byte sequence with per-byte significance; `??` in the IDA-style form is a
/// wildcard byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytePattern {
    bytes: Vec<u8>,
    mask: Vec<bool>,
}

impl BytePattern {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            mask: vec![true; bytes.len()],
        }
    }

    pub fn from_ascii(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    /// UTF-16LE encoding of `text`.
    pub fn from_unicode(text: &str) -> Self {
        let bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
        Self::from_bytes(&bytes)
    }

    /// Parses `"12 34 ?? 56"`; separators are optional between full byte pairs.
    pub fn from_ida_pattern(pattern: &str) -> Result<Self, PatternError> {
        let mut bytes = Vec::new();
        let mut mask = Vec::new();

        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            if c.is_whitespace() || c == ',' {
                continue;
            }

            if c == '?' {
                bytes.push(0);
                mask.push(false);
                if chars.peek() == Some(&'?') {
                    chars.next();
                }
            } else if c.is_ascii_hexdigit() {
                let mut hex = String::from(c);
                if let Some(next) = chars.next_if(|n| n.is_ascii_hexdigit()) {
                    hex.push(next);
                }
                let byte = u8::from_str_radix(&hex, 16)
                    .map_err(|_| PatternError::InvalidBytePattern(pattern.to_string()))?;
                bytes.push(byte);
                mask.push(true);
            } else {
                return Err(PatternError::InvalidBytePattern(pattern.to_string()));
            }
        }

        if bytes.is_empty() {
            return Err(PatternError::Empty);
        }

        Ok(Self { bytes, mask })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        if data.len() < self.bytes.len() {
            return false;
        }

        self.bytes
            .iter()
            .zip(self.mask.iter())
            .zip(data.iter())
            .all(|((pattern_byte, &significant), &data_byte)| !significant || *pattern_byte == data_byte)
    }

    /// First match at or after `start`.
    pub fn find_from(&self, data: &[u8], start: usize) -> Option<usize> {
        if self.bytes.is_empty() || data.len() < self.bytes.len() {
            return None;
        }

        let last = data.len() - self.bytes.len();
        if start > last {
            return None;
        }

        match self.mask.iter().position(|&m| m) {
            Some(anchor) => {
                let first_byte = self.bytes[anchor];
                (start..=last).find(|&i| data[i + anchor] == first_byte && self.matches(&data[i..]))
            }
            None => Some(start),
        }
    }

    pub fn find_in(&self, data: &[u8]) -> Option<usize> {
        self.find_from(data, 0)
    }
}

impl fmt::Display for BytePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .bytes
            .iter()
            .zip(&self.mask)
            .map(|(b, &m)| if m { format!("{:02X}", b) } else { "??".to_string() })
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ida_pattern() {
        let pattern = BytePattern::from_ida_pattern("12 34 ?? 56").unwrap();
        assert_eq!(pattern.len(), 4);
        assert_eq!(pattern.to_string(), "12 34 ?? 56");

        let data = [0x00, 0x12, 0x34, 0xFF, 0x56, 0x12, 0x34, 0x00, 0x56];
        assert_eq!(pattern.find_in(&data), Some(1));
        assert_eq!(pattern.find_from(&data, 2), Some(5));
        assert_eq!(pattern.find_from(&data, 6), None);
    }

    #[test]
    fn test_compact_and_invalid_forms() {
        assert_eq!(
            BytePattern::from_ida_pattern("00BF").unwrap(),
            BytePattern::from_bytes(&[0x00, 0xBF])
        );
        assert!(BytePattern::from_ida_pattern("12 zz").is_err());
        assert!(matches!(BytePattern::from_ida_pattern("  "), Err(PatternError::Empty)));
    }

    #[test]
    fn test_text_encodings() {
        assert_eq!(BytePattern::from_ascii("OK").bytes, b"OK".to_vec());
        assert_eq!(BytePattern::from_unicode("OK").bytes, vec![b'O', 0, b'K', 0]);
    }
}
