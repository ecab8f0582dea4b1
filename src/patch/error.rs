// Wed Jan 14 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Patch definition not found: {0}")]
    DefinitionNotFound(String),
    #[error("Duplicate {kind}: {key}")]
    Duplicate { kind: &'static str, key: String },
    #[error("Patch at 0x{address:08X} changes size ({original} -> {patched} bytes)")]
    LengthMismatch { address: u32, original: usize, patched: usize },
    #[error("Patch at 0x{address:08X} ({len} bytes) is outside the file")]
    OutOfBounds { address: u32, len: usize },
}
