// Tue Jan 15 2026 - Alex

pub mod config;
pub mod image;
pub mod analysis;
pub mod pattern;
pub mod assembler;
pub mod patch;
pub mod scripting;
pub mod utils;
pub mod cli;

pub use config::Config;
pub use image::{BinaryImage, PeImage};
pub use analysis::{CodeFlowAnalyzer, CodeMap};
pub use assembler::{Assembler, CodeType};
pub use patch::{PatchStore, apply_definition};
pub use scripting::{ScriptReport, ScriptRunner};
