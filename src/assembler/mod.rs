// Wed Jan 14 2026 - Alex

pub mod armasm;
pub mod error;
pub mod source;

pub use armasm::ArmAsm;
pub use error::AssemblerError;

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeType {
    Arm,
    Thumb,
    Thumb2,
}

impl CodeType {
    pub fn directive(&self) -> &'static str {
        match self {
            CodeType::Arm => "ARM",
            CodeType::Thumb | CodeType::Thumb2 => "THUMB",
        }
    }
}

impl FromStr for CodeType {
    type Err = AssemblerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "arm" => Ok(CodeType::Arm),
            "thumb" => Ok(CodeType::Thumb),
            "thumb2" => Ok(CodeType::Thumb2),
            _ => Err(AssemblerError::UnknownCodeType(s.to_string())),
        }
    }
}

impl fmt::Display for CodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodeType::Arm => "ARM",
            CodeType::Thumb => "Thumb",
            CodeType::Thumb2 => "Thumb2",
        };
        write!(f, "{}", name)
    }
}

/// Compiles an assembly fragment anchored at a virtual address.
pub trait Assembler {
    fn compile(&self, origin: u32, code_type: CodeType, body: &str) -> Result<Vec<u8>, AssemblerError>;
}

impl<F> Assembler for F
where
    F: Fn(u32, CodeType, &str) -> Result<Vec<u8>, AssemblerError>,
{
    fn compile(&self, origin: u32, code_type: CodeType, body: &str) -> Result<Vec<u8>, AssemblerError> {
        self(origin, code_type, body)
    }
}

/// Stand-in used when no assembler is configured.
pub struct NoAssembler;

impl Assembler for NoAssembler {
    fn compile(&self, _origin: u32, _code_type: CodeType, _body: &str) -> Result<Vec<u8>, AssemblerError> {
        Err(AssemblerError::NotConfigured)
    }
}
