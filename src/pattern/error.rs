// Tue Jan 13 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("Syntax error at column {column}: unexpected '{character}'")]
    Syntax { column: usize, character: char },
    #[error("Unterminated string starting at column {0}")]
    UnterminatedString(usize),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Invalid byte pattern: {0}")]
    InvalidBytePattern(String),
    #[error("Empty pattern")]
    Empty,
}
