// Wed Jan 14 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssemblerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No assembler configured")]
    NotConfigured,
    #[error("Unknown code type: {0}")]
    UnknownCodeType(String),
    #[error("Assembler failed:\n{0}")]
    Failed(String),
    #[error("Assembler timed out after {0}s")]
    Timeout(u64),
    #[error("Invalid object file: {0}")]
    InvalidObject(String),
    #[error("Object file has no code section")]
    NoCodeSection,
    #[error("Assembled code is empty")]
    Empty,
}

impl From<goblin::error::Error> for AssemblerError {
    fn from(err: goblin::error::Error) -> Self {
        AssemblerError::InvalidObject(err.to_string())
    }
}
