// Tue Jan 13 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Binary parse error: {0}")]
    BinaryParseError(String),
    #[error("Virtual address 0x{0:08X} is not inside any section")]
    AddressNotMapped(u32),
    #[error("Raw offset 0x{0:08X} is outside the file")]
    OffsetOutOfBounds(u32),
    #[error("Image has no checksum field")]
    NoChecksumField,
}
