// Thu Jan 15 2026 - Alex

use crate::analysis::AnalysisError;
use crate::assembler::AssemblerError;
use crate::image::ImageError;
use crate::patch::PatchError;
use crate::pattern::PatternError;
use thiserror::Error;

/// Problems binding one command line to a registered command.
#[derive(Error, Debug)]
pub enum BindError {
    #[error("{0}")]
    Tokenize(#[from] PatternError),
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
    #[error("Expected a command name, found '{0}'")]
    MissingCommand(String),
    #[error("{command} has no parameter '{name}'")]
    UnknownParameter { command: &'static str, name: String },
    #[error("{command} takes at most {max} parameters")]
    TooManyParameters { command: &'static str, max: usize },
    #[error("{command} is missing parameter '{name}'")]
    MissingParameter { command: &'static str, name: &'static str },
    #[error("{command}: parameter '{name}' given twice")]
    DuplicateParameter { command: &'static str, name: &'static str },
    #[error("{0}: positional parameters must precede named ones")]
    PositionalAfterNamed(&'static str),
    #[error("Unexpected '{0}'")]
    UnexpectedToken(String),
    #[error("Invalid value '{value}' for {name}: {reason}")]
    InvalidValue { name: &'static str, value: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Line {line}: {source}")]
    Command {
        line: usize,
        #[source]
        source: BindError,
    },
    #[error("Line {line}: label '{label}' is already defined")]
    DuplicateLabel { line: usize, label: String },
    #[error("Line {line}: invalid label '{label}'")]
    InvalidLabel { line: usize, label: String },
    #[error("Line {line}: label '{label}' follows another label for the same line")]
    LabelAlreadyAssigned { line: usize, label: String },
    #[error("Line {line}: PatchCode block is not terminated")]
    UnterminatedCode { line: usize },
    #[error("Line {line}: EndCode without PatchCode")]
    UnexpectedEndCode { line: usize },
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("No patch definition is active")]
    NoDefinition,
    #[error("No file is open for patching")]
    NoOpenFile,
    #[error("Label not found: {0}")]
    LabelNotFound(String),
    #[error("Label already defined: {0}")]
    DuplicateLabel(String),
    #[error("Address 0x{0:08X} is not mapped")]
    BadAddress(u32),
    #[error("No instruction at 0x{0:08X}")]
    NoInstruction(u32),
    #[error("Instruction at 0x{address:08X} is not a conditional jump ({text})")]
    NotConditionalJump { address: u32, text: String },
    #[error("Instruction at 0x{0:08X} has no target address")]
    NoTarget(u32),
    #[error("Branch from 0x{from:08X} to 0x{to:08X} cannot be encoded in {size} bytes")]
    BranchOutOfRange { from: u32, to: u32, size: u32 },
    #[error("Instruction at 0x{address:08X} has unsupported width {size}")]
    UnsupportedWidth { address: u32, size: u32 },
    #[error("Match index {0} is outside the code map")]
    IndexOutOfRange(i64),
    #[error("Jump history is empty")]
    EmptyHistory,
    #[error("Step limit of {0} commands exceeded")]
    StepLimit(usize),
    #[error("No definitions path is configured")]
    NoDefinitionsPath,
    #[error("{0}")]
    Raised(String),
    #[error("Image error: {0}")]
    Image(#[from] ImageError),
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("Assembler error: {0}")]
    Assembler(#[from] AssemblerError),
    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Line {line} ({command}): {source}")]
    Execution {
        line: usize,
        command: String,
        #[source]
        source: ExecutionError,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),
}
