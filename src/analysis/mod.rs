// Tue Jan 13 2026 - Alex

pub mod instruction;
pub mod thumb;
pub mod encoder;
pub mod code_map;
pub mod analyzer;
pub mod cache;
pub mod error;

pub use instruction::{
    is_conditional_jump_mnemonic, is_jump_mnemonic, is_register, normalize_register_aliases,
    parse_number, Instruction,
};
pub use thumb::ThumbDecoder;
pub use code_map::CodeMap;
pub use analyzer::{AnalysisTrace, CodeFlowAnalyzer};
pub use cache::ListingCache;
pub use error::AnalysisError;

use crate::image::BinaryImage;

/// Analyses `image` from scratch.
pub fn analyze<I: BinaryImage + ?Sized>(image: &I) -> CodeMap {
    CodeFlowAnalyzer::new(image).analyze()
}
