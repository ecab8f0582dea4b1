// Wed Jan 14 2026 - Alex

//! Serde codecs for the store's text fields: byte arrays as contiguous
//! uppercase hex, addresses as `0x%08X`.

pub mod bytes {
    use crate::utils::hash::{from_hex, to_hex};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_hex(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        from_hex(&text).ok_or_else(|| de::Error::custom(format!("invalid hex byte string: {}", text)))
    }
}

pub mod address {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:08X}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .ok_or_else(|| de::Error::custom(format!("invalid address: {}", text)))
    }
}
