// Tue Jan 13 2026 - Alex

pub mod bytes;
pub mod error;
pub mod matcher;
pub mod token;

pub use bytes::BytePattern;
pub use error::PatternError;
pub use matcher::{matches, matches_text, InstructionPattern};
pub use token::{tokenize, tokenize_instruction, Token, TokenKind};
